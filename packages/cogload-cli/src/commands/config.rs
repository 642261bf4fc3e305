use crate::cli::ConfigArgs;
use crate::exit_codes;
use crate::output;
use crate::settings;

pub fn execute(args: ConfigArgs) -> i32 {
    let config = match settings::resolve(&args.analysis) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::INPUT_ERROR;
        }
    };

    match output::to_json(&config, args.compact) {
        Ok(json) => {
            if let Err(e) = output::write_output(&json, None) {
                eprintln!("Error: {}", e);
                return exit_codes::EXECUTION_ERROR;
            }
            exit_codes::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            exit_codes::EXECUTION_ERROR
        }
    }
}
