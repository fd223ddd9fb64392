use std::panic;
use std::sync::Once;

static INIT: Once = Once::new();

pub fn init_logging() {
    INIT.call_once(|| {
        // env_logger honors RUST_LOG; default to info so the starvation and
        // session warnings are visible out of the box.
        let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .try_init();

        set_panic_hook();

        log::debug!("logging initialized");
    });
}

/// Route panics through the logger before the default hook runs, so a crash
/// inside the processing thread ends up in the session log and not only on
/// a detached stderr.
fn set_panic_hook() {
    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        let payload = panic_info.payload();
        let msg = if let Some(s) = payload.downcast_ref::<&str>() {
            *s
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.as_str()
        } else {
            "Box<Any>"
        };

        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown location".to_string());

        let bt = backtrace::Backtrace::new();

        log::error!("panic: {}\nlocation: {}\nbacktrace:\n{:?}", msg, location, bt);

        default_hook(panic_info);
    }));
}
