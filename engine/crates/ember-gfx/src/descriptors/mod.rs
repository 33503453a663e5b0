pub mod descriptor_allocator;
pub mod descriptor_layout;
pub mod descriptor_writer;
