use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::FieldErrors;

pub const MAX_TITLE: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NewPost {
    pub title: String,
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostView {
    pub id: Uuid,
    pub title: String,
    pub content: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NewPost {
    pub fn validate(&self) -> Result<NewPost, FieldErrors> {
        let mut errors = FieldErrors::default();
        let title = self.title.trim();

        if title.is_empty() {
            errors.push("title", "Title is required");
        } else if title.chars().count() > MAX_TITLE {
            errors.push("title", "Title must be at most 200 characters");
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(NewPost {
            title: title.to_string(),
            content: self.content.clone().filter(|c| !c.is_empty()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_required() {
        let post = NewPost {
            title: "   ".into(),
            content: None,
        };
        assert!(post.validate().unwrap_err().has("title"));
    }

    #[test]
    fn test_trims_and_clears() {
        let post = NewPost {
            title: "  Hello ".into(),
            content: Some(String::new()),
        }
        .validate()
        .unwrap();

        assert_eq!(post.title, "Hello");
        assert_eq!(post.content, None);
    }
}
