use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Operator rating for a diagnosis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackRating {
    Good,
    CanBeBetter,
    Bad,
}

impl FeedbackRating {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackRating::Good => "good",
            FeedbackRating::CanBeBetter => "can_be_better",
            FeedbackRating::Bad => "bad",
        }
    }
}

impl fmt::Display for FeedbackRating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeedbackRating {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "good" => Ok(FeedbackRating::Good),
            "can_be_better" | "better" => Ok(FeedbackRating::CanBeBetter),
            "bad" => Ok(FeedbackRating::Bad),
            other => Err(format!("unknown rating '{}' (expected good, can_be_better or bad)", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rating_wire_names() {
        assert_eq!(
            serde_json::to_value(FeedbackRating::CanBeBetter).unwrap(),
            serde_json::json!("can_be_better")
        );
        assert_eq!(FeedbackRating::Good.to_string(), "good");
    }

    #[test]
    fn test_rating_parses_loose_spellings() {
        assert_eq!("Can be better".parse::<FeedbackRating>(), Ok(FeedbackRating::CanBeBetter));
        assert_eq!("can-be-better".parse::<FeedbackRating>(), Ok(FeedbackRating::CanBeBetter));
        assert_eq!(" BAD ".parse::<FeedbackRating>(), Ok(FeedbackRating::Bad));
        assert!("meh".parse::<FeedbackRating>().is_err());
    }
}
