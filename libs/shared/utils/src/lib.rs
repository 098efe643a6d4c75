pub mod dates;
pub mod extract;
pub mod extractor;
pub mod jwt;
pub mod test_utils;
