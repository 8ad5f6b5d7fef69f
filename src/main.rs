fn main() {
    if let Err(err) = pmax_insights::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
