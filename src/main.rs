fn main() {
    if let Err(err) = potwatch_lib::run() {
        log::error!("potwatch exited with error: {err:#}");
        eprintln!("potwatch: {err:#}");
        std::process::exit(1);
    }
}
