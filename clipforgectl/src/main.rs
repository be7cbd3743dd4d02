use clap::Parser;

fn main() {
    let cli = clipforgectl::Cli::parse();
    clipforgectl::init_tracing(cli.verbose);
    if let Err(err) = clipforgectl::run(cli) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
