fn main() {
    if let Err(err) = bagscan_lib::run() {
        log::error!("{err:#}");
        std::process::exit(1);
    }
}
