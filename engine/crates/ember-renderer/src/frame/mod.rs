pub mod frame_counter;
pub mod frame_manager;
