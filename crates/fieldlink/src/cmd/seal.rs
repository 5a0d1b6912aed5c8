use fieldlink_stage::integrity;

use crate::cmd::SealArgs;
use crate::exit::{CliError, CliResult, SUCCESS, USAGE};

pub fn run(args: SealArgs) -> CliResult<i32> {
    let payload = resolve_payload(&args)?;
    let frame = integrity::seal(&payload, !args.little_endian);
    println!("{}", hex::encode(&frame));
    Ok(SUCCESS)
}

fn resolve_payload(args: &SealArgs) -> CliResult<Vec<u8>> {
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(text) = &args.hex {
        return hex::decode(text)
            .map_err(|err| CliError::new(USAGE, format!("--hex is not valid hex: {err}")));
    }
    Err(CliError::new(USAGE, "one of --data or --hex is required"))
}
