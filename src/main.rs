use baton::core::error::BatonError;
use baton::ExitStatus;

// Exit codes are part of the command contract: scripts wrapping `baton end`
// distinguish a refused unattributed session from a partial commit.
const EXIT_ERROR: i32 = 1;
const EXIT_PARTIAL_FAILURE: i32 = 2;
const EXIT_UNKNOWN_LOCATION: i32 = 3;

fn main() {
    let code = match baton::run() {
        Ok(ExitStatus::Success) => 0,
        Ok(ExitStatus::PartialFailure) => EXIT_PARTIAL_FAILURE,
        Err(err) => {
            eprintln!("error: {}", err);
            match err {
                BatonError::UnknownLocation(_) => EXIT_UNKNOWN_LOCATION,
                _ => EXIT_ERROR,
            }
        }
    };
    std::process::exit(code);
}
