fn main() {
    if let Err(err) = dsm_layout::run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
