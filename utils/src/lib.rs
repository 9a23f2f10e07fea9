mod archive;
mod file;
mod logging;
mod time;

pub use archive::{extract_targz, single_top_level_dir};
pub use file::{files_with_suffix, find_yaml_files, is_yaml_file};
pub use logging::{
    current_delivery_id, inherit_delivery_id, log_level_from_env, setup_logging, with_delivery_id,
};
pub use time::get_timestamp;
