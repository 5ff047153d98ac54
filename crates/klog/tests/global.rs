//! Integration tests for the global logger installed through `klog::init`.

use std::sync::{Arc, Mutex, OnceLock};

use log::{Level, LevelFilter};

static LINES: OnceLock<Arc<Mutex<Vec<String>>>> = OnceLock::new();

struct Capture(Arc<Mutex<Vec<String>>>);

impl klog::LogOutput for Capture {
    fn write_line(&self, line: &str) {
        self.0.lock().unwrap().push(line.to_string());
    }
}

fn init_once() -> Arc<Mutex<Vec<String>>> {
    LINES
        .get_or_init(|| {
            let lines = Arc::new(Mutex::new(Vec::new()));
            klog::set_output(Box::new(Capture(lines.clone())));
            klog::init(LevelFilter::Debug);
            lines
        })
        .clone()
}

#[test]
fn test_facade_reaches_buffer_and_console() {
    let lines = init_once();
    while klog::read_log().is_some() {}

    log::error!(target: "global", "device {} gone", 3);

    let entry = std::iter::from_fn(klog::read_log)
        .find(|e| e.target() == "global")
        .unwrap();
    assert_eq!(entry.level(), Level::Error);
    assert_eq!(entry.message(), "device 3 gone");
    assert!(
        lines
            .lock()
            .unwrap()
            .iter()
            .any(|l| l.ends_with("device 3 gone"))
    );
}

#[test]
fn test_init_is_idempotent() {
    init_once();
    klog::init(LevelFilter::Info);
    assert_eq!(log::max_level(), LevelFilter::Info);
    klog::init(LevelFilter::Debug);
    assert_eq!(log::max_level(), LevelFilter::Debug);
}
