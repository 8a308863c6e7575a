fn main() {
    pageturn_cli::init_tracing();

    if let Err(error) = pageturn_cli::run(std::env::args_os()) {
        eprintln!("{error:#}");
        std::process::exit(1);
    }
}
