use std::process::ExitCode;

fn main() -> ExitCode {
    match canvas_doc::cli::run_from_env() {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
