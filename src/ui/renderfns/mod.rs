pub mod footer;
pub mod header;
pub mod utils;

pub use footer::draw_footer;
pub use header::draw_header;
pub use utils::{format_age, format_timestamp, sort_arrow, status_color, truncate};
