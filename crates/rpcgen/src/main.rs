fn main() {
    rpcgen_cli::init_tracing();
    std::process::exit(rpcgen_cli::run_cli(std::env::args().collect()));
}
