//! Regex patterns for coercing model-returned dates.
//!
//! All patterns are anchored; they are applied to a single trimmed value.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // 2020-03-15, 2020/3/15, 2020.03.15
    pub static ref DATE_YMD: Regex = Regex::new(
        r"^(\d{4})\s*[-/.]\s*(\d{1,2})\s*[-/.]\s*(\d{1,2})$"
    ).unwrap();

    // 2020-03, 2020/3, 2020.03
    pub static ref DATE_YM: Regex = Regex::new(
        r"^(\d{4})\s*[-/.]\s*(\d{1,2})$"
    ).unwrap();

    // 2020年3月, 2020年3月15日
    pub static ref DATE_CJK: Regex = Regex::new(
        r"^(\d{4})\s*年\s*(\d{1,2})\s*月(?:\s*(\d{1,2})\s*[日号])?$"
    ).unwrap();

    // 202003
    pub static ref DATE_COMPACT: Regex = Regex::new(
        r"^(\d{4})(\d{2})$"
    ).unwrap();

    // Ongoing end dates
    pub static ref ONGOING: Regex = Regex::new(
        r"(?i)^(?:至今|至今在职|现在|目前|present|now|current|ongoing|till\s+now|to\s+date)$"
    ).unwrap();
}
