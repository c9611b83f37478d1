//! Rule-based topic classification.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// Points for a keyword found in the title or body.
const TEXT_SCORE: u32 = 2;
/// Points for a keyword matching a tag.
const TAG_SCORE: u32 = 1;
/// Points for a matching code-block language.
const LANGUAGE_SCORE: u32 = 2;

/// Keywords and code languages that identify one topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicRule {
    pub name: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub languages: Vec<String>,
}

impl TopicRule {
    fn new(name: &str, keywords: &[&str], languages: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            keywords: keywords.iter().map(|k| (*k).to_string()).collect(),
            languages: languages.iter().map(|l| (*l).to_string()).collect(),
        }
    }
}

/// The full classifier configuration. Rule order breaks score ties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicRules {
    /// Body words that mark a post as study material on their own.
    #[serde(default = "default_study_words")]
    pub study_words: Vec<String>,
    #[serde(default)]
    pub topics: Vec<TopicRule>,
}

fn default_study_words() -> Vec<String> {
    ["정리", "개념", "설명", "예제", "코드", "실습", "에러", "해결"]
        .iter()
        .map(|w| (*w).to_string())
        .collect()
}

impl Default for TopicRules {
    fn default() -> Self {
        Self {
            study_words: default_study_words(),
            topics: vec![
                TopicRule::new(
                    "Java/JSP/Servlet",
                    &["jsp", "servlet", "jstl", "el", "tomcat", "mvc", "java"],
                    &["java", "jsp"],
                ),
                TopicRule::new(
                    "DB/SQL",
                    &["jdbc", "sql", "mysql", "mariadb", "oracle", "postgres", "db"],
                    &["sql"],
                ),
                TopicRule::new(
                    "Web/FE",
                    &["html", "css", "javascript", "js", "ts", "react", "vue", "scss"],
                    &["javascript", "typescript", "tsx", "jsx", "css", "scss"],
                ),
            ],
        }
    }
}

/// Outcome of classifying one post.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    pub is_study: bool,
    /// Best-scoring topic.
    pub major_topic: Option<String>,
    /// Every topic with a positive score, best first.
    pub topics: Vec<String>,
}

impl TopicRules {
    /// Parse rules from TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if the document does not match the rule schema.
    pub fn from_toml_str(source: &str) -> Result<Self, toml::de::Error> {
        let rules: Self = toml::from_str(source)?;
        Ok(rules.normalized())
    }

    /// Load rules from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path).map_err(|e| ConfigError::TopicRules {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_toml_str(&source).map_err(|e| ConfigError::TopicRules {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Lowercase every keyword and language and drop blanks.
    fn normalized(mut self) -> Self {
        let clean = |values: &mut Vec<String>| {
            *values = values
                .iter()
                .map(|v| v.trim().to_lowercase())
                .filter(|v| !v.is_empty())
                .collect();
        };
        clean(&mut self.study_words);
        for topic in &mut self.topics {
            clean(&mut topic.keywords);
            clean(&mut topic.languages);
        }
        self
    }

    /// Score `title`/`body`/`tags`/`code_languages` against every rule.
    #[must_use]
    pub fn classify(
        &self,
        title: &str,
        body: &str,
        tags: &[String],
        code_languages: &[String],
    ) -> Classification {
        let title = title.to_lowercase();
        let body = body.to_lowercase();
        let tag_set: HashSet<String> = tags.iter().map(|t| t.to_lowercase()).collect();
        let lang_set: HashSet<String> = code_languages.iter().map(|l| l.to_lowercase()).collect();

        let mut scored: Vec<(&str, u32)> = Vec::new();
        for rule in &self.topics {
            let mut score = 0;
            if rule
                .keywords
                .iter()
                .any(|kw| title.contains(kw.as_str()) || body.contains(kw.as_str()))
            {
                score += TEXT_SCORE;
            }
            if rule.keywords.iter().any(|kw| tag_set.contains(kw)) {
                score += TAG_SCORE;
            }
            if rule.languages.iter().any(|l| lang_set.contains(l)) {
                score += LANGUAGE_SCORE;
            }
            if score > 0 {
                scored.push((rule.name.as_str(), score));
            }
        }

        // Stable sort keeps declaration order among equal scores.
        scored.sort_by(|a, b| b.1.cmp(&a.1));

        let topics: Vec<String> = scored.iter().map(|(name, _)| (*name).to_string()).collect();
        let is_study = !topics.is_empty()
            || self
                .study_words
                .iter()
                .any(|w| body.contains(w.as_str()));

        Classification {
            is_study,
            major_topic: topics.first().cloned(),
            topics,
        }
    }
}
