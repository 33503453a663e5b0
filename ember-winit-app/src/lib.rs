pub mod app;
pub mod scale_overlay;
pub mod winit_event_adapter;
