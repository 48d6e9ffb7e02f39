use crate::Split;
use log::info;

pub fn parse_split(s: &str) -> Option<Split> {
    match s.to_lowercase().as_str() {
        "train" => Some(Split::Train),
        "valid" | "validation" => Some(Split::Valid),
        "test" => Some(Split::Test),
        other => {
            info!("Unknown split '{}'..!", other);
            None
        }
    }
}
