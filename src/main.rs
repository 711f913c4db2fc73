use clap::Parser;

use colab_gcp_auth::{
    cli::{report_error, run, Cli},
    logging,
};

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    let error_format = cli.error_format;
    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(error) => {
            report_error(&error, error_format);
            std::process::exit(1);
        }
    }
}
