fn main() {
    match csv_normalizer::run() {
        Ok(status) => std::process::exit(status.code()),
        Err(err) => {
            eprintln!("error: {err:#}");
            std::process::exit(1);
        }
    }
}
