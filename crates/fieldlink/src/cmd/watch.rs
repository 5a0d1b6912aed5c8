use std::time::Duration;

use bytes::Bytes;
use fieldlink_session::{Session, SessionConfig};
use fieldlink_stage::stamp::StampMode;
use fieldlink_stage::{EventSinks, StageRegistry, DEFAULT_EVENT_CAPACITY};
use fieldlink_transport::{Identity, TcpTransport, Transport, TransportKind, UdpTransport};

use crate::cmd::{TransportArg, WatchArgs};
use crate::exit::{
    session_error, transport_error, CliError, CliResult, DEVICE_LOST, INTERNAL, SUCCESS, USAGE,
};
use crate::output::{print_frame, OutputFormat};

pub async fn run(args: WatchArgs, format: OutputFormat) -> CliResult<i32> {
    let config = session_config(&args)?;
    let identity = identity_for(&args)?;

    match args.transport {
        TransportArg::Tcp => {
            let transport = TcpTransport::connect(&args.target)
                .await
                .map_err(|err| transport_error("connect failed", err))?;
            watch(transport, identity, config, args.count, format).await
        }
        TransportArg::Udp => {
            let transport = UdpTransport::connect(&args.target)
                .await
                .map_err(|err| transport_error("connect failed", err))?;
            watch(transport, identity, config, args.count, format).await
        }
    }
}

async fn watch<T: Transport + 'static>(
    transport: T,
    identity: String,
    config: SessionConfig,
    count: Option<usize>,
    format: OutputFormat,
) -> CliResult<i32> {
    let (sinks, mut signals, mut alarms) = EventSinks::bounded(DEFAULT_EVENT_CAPACITY);
    let mut session = Session::new(identity.clone(), StageRegistry::with_builtins(), sinks)
        .with_config(config);

    session
        .init(transport)
        .await
        .map_err(|err| session_error("session init failed", err))?;
    let mut output = session
        .take_output()
        .ok_or_else(|| CliError::new(INTERNAL, "session output already taken"))?;
    session
        .run()
        .await
        .map_err(|err| session_error("session start failed", err))?;
    let cancel = session.cancel_token();

    let mut printed = 0usize;
    let mut device_lost = false;

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(err) = result {
                    tracing::warn!("ctrl-c handler failed: {err}");
                }
                break;
            }
            _ = cancel.cancelled() => {
                device_lost = true;
                break;
            }
            signal = signals.recv() => match signal {
                Some(signal) if signal.kind.is_fatal() => {
                    tracing::error!(kind = ?signal.kind, origin = %signal.origin, "{}", signal.detail);
                }
                Some(signal) => {
                    tracing::info!(kind = ?signal.kind, origin = %signal.origin, "{}", signal.detail);
                }
                None => break,
            },
            alarm = alarms.recv() => {
                if let Some(alarm) = alarm {
                    tracing::warn!(kind = ?alarm.kind, origin = %alarm.origin, "{}", alarm.detail);
                }
            }
            frame = output.recv() => match frame {
                Some(frame) => {
                    print_frame(&identity, &frame, format);
                    printed = printed.saturating_add(1);
                    if count.is_some_and(|count| printed >= count) {
                        break;
                    }
                }
                None => break,
            },
        }
    }

    session.shutdown().await;
    if device_lost {
        Ok(DEVICE_LOST)
    } else {
        Ok(SUCCESS)
    }
}

fn identity_for(args: &WatchArgs) -> CliResult<String> {
    let (device, port) = args
        .target
        .rsplit_once(':')
        .ok_or_else(|| CliError::new(USAGE, "target must be <host>:<port>"))?;
    let port: u16 = port
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid target port: {port}")))?;
    let kind = match args.transport {
        TransportArg::Tcp => TransportKind::Tcp,
        TransportArg::Udp => TransportKind::Udp,
    };
    Ok(Identity::new(device, Some(port), kind).to_string())
}

fn session_config(args: &WatchArgs) -> CliResult<SessionConfig> {
    if args.miss_limit == 0 {
        return Err(CliError::new(USAGE, "--miss-limit must be greater than zero"));
    }
    if args.fail_limit == 0 {
        return Err(CliError::new(USAGE, "--fail-limit must be greater than zero"));
    }

    Ok(SessionConfig {
        liveness_timeout: parse_duration(&args.timeout)?,
        liveness_miss_limit: args.miss_limit,
        integrity_big_endian: !args.little_endian,
        integrity_fail_limit: args.fail_limit,
        stamp_mode: if args.tail {
            StampMode::Tail
        } else {
            StampMode::Head
        },
        stamp_separator: Bytes::from(args.separator.clone().into_bytes()),
        auto_timestamp: !args.no_timestamp,
    })
}

fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        _ => Err(CliError::new(
            USAGE,
            format!("unsupported duration unit: {unit}"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(target: &str, transport: TransportArg) -> WatchArgs {
        WatchArgs {
            target: target.to_string(),
            transport,
            timeout: "8s".to_string(),
            miss_limit: 3,
            fail_limit: 20,
            little_endian: false,
            tail: false,
            separator: "/-/".to_string(),
            no_timestamp: false,
            count: None,
        }
    }

    #[test]
    fn identity_follows_the_canonical_grammar() {
        let identity = identity_for(&args("192.168.1.10:6668", TransportArg::Tcp)).unwrap();
        assert_eq!(identity, "192.168.1.10:6668:TCP");

        let identity = identity_for(&args("10.0.0.7:9000", TransportArg::Udp)).unwrap();
        assert_eq!(identity, "10.0.0.7:9000:UDP");
    }

    #[test]
    fn rejects_target_without_port() {
        let err = identity_for(&args("just-a-host", TransportArg::Tcp)).unwrap_err();
        assert_eq!(err.code, USAGE);
    }

    #[test]
    fn rejects_zero_limits() {
        let mut zero_miss = args("192.168.1.10:6668", TransportArg::Tcp);
        zero_miss.miss_limit = 0;
        assert_eq!(session_config(&zero_miss).unwrap_err().code, USAGE);

        let mut zero_fail = args("192.168.1.10:6668", TransportArg::Tcp);
        zero_fail.fail_limit = 0;
        assert_eq!(session_config(&zero_fail).unwrap_err().code, USAGE);
    }

    #[test]
    fn parses_duration_suffixes() {
        assert_eq!(parse_duration("8s").unwrap(), Duration::from_secs(8));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("2").unwrap(), Duration::from_secs(2));
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("8h").is_err());
    }
}
