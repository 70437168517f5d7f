pub mod fan_out;
pub mod light_command;

#[cfg(test)]
pub mod test_support;
