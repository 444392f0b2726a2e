pub mod meter_poller;
pub mod notifier;
pub mod preparer;
pub mod record_session;
