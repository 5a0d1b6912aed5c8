use fieldlink_stage::integrity;

use crate::cmd::VerifyArgs;
use crate::exit::{CliError, CliResult, DATA_INVALID, SUCCESS, USAGE};

pub fn run(args: VerifyArgs) -> CliResult<i32> {
    let frame = hex::decode(args.frame.trim())
        .map_err(|err| CliError::new(USAGE, format!("frame is not valid hex: {err}")))?;

    if integrity::verify(&frame, !args.little_endian) {
        println!("ok");
        Ok(SUCCESS)
    } else {
        println!("corrupt");
        Ok(DATA_INVALID)
    }
}
