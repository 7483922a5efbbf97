// Export modules for use in tests
pub mod event_source;
pub mod excerpt;
pub mod library;
pub mod main_app;
pub mod notification;
pub mod panic_handler;
pub mod pdf;
pub mod reader;
pub mod selection;
pub mod settings;
pub mod theme;
pub mod ui;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

// Re-export main app components
pub use main_app::{App, AppAction, AppView, run_app_with_event_source};
