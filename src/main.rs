fn main() {
    if let Err(e) = focus_billing::run() {
        eprintln!("focus-billing exited with error: {}", e);
        std::process::exit(1);
    }
}
