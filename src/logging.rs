use flexi_logger::{opt_format, Logger};

pub fn setup_logging() {
    Logger::try_with_env_or_str("info")
        .unwrap()
        .format(opt_format)
        .start()
        .unwrap();
}
