/// Initialize the logger with the specified verbosity level
///
/// # Arguments
/// * `verbose` - Verbosity level (0=warn, 1=info, 2=debug, 3+=trace)
pub fn setup_logger(verbose: u8) {
    let env_filter = match verbose {
        0 => "fair_monitor=warn",
        1 => "fair_monitor=info",
        2 => "fair_monitor=debug",
        _ => "fair_monitor=trace",
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(env_filter))
        .format_timestamp_millis()
        .format_module_path(false)
        .init();
}
