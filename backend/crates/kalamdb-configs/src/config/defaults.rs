// Default value functions

pub fn default_max_columns() -> usize {
    1000
}

pub fn default_max_depth() -> usize {
    20
}

pub fn default_array_length_min_version() -> u64 {
    1
}

pub fn default_false() -> bool {
    false
}

pub fn default_log_level() -> String {
    "info".to_string()
}

pub fn default_log_format() -> String {
    "compact".to_string()
}

pub fn default_true() -> bool {
    true
}
