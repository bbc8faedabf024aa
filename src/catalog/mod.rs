//! Prompt catalog: the ordered list of prompts a job walks through.
//!
//! The catalog is configuration. `PromptCatalog::builtin()` carries the
//! reference pack (five prompts for each of three builds); a JSON file with
//! the same shape can replace it via `CATALOG_PATH` or `--catalog`.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::error::{AppError, AppResult};

/// Category tag partitioning prompts, results and archive folders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Underweight,
    Overweight,
    Muscular,
}

impl Category {
    pub const ALL: [Category; 3] =
        [Category::Underweight, Category::Overweight, Category::Muscular];

    /// Folder and file-name stem used inside archives.
    pub fn slug(&self) -> &'static str {
        match self {
            Category::Underweight => "underweight",
            Category::Overweight => "overweight",
            Category::Muscular => "muscular",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Category::Underweight => "Underweight build",
            Category::Overweight => "Overweight build",
            Category::Muscular => "Muscular build",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptSpec {
    pub text: String,
    pub category: Category,
}

impl PromptSpec {
    pub fn new(text: impl Into<String>, category: Category) -> Self {
        PromptSpec { text: text.into(), category }
    }
}

const UNDERWEIGHT_PROMPTS: [&str; 5] = [
    "Medium-long shot of this person with an extremely thin build and a look of deep sadness, in a dimly lit room.",
    "Waist-up photo of this person, very thin, facial features sharpened by the thinness, looking melancholically into the mirror of a neglected bathroom.",
    "This person in a medium shot, a very thin body in loose clothes and a sad face, sitting alone on a bench in a desolate park (outdoors).",
    "A medium-long portrait of this person looking fragile and very thin, in an empty, messy living room.",
    "Artistic medium-long photograph of this person with prominent facial bones and a sad expression, in their bedroom.",
];

const OVERWEIGHT_PROMPTS: [&str; 5] = [
    "Medium-long shot of this person with massive excess weight and a very sad expression, sitting on a living-room sofa with some snacks on the table.",
    "Waist-up photo of this person with an extremely heavy body, looking dejectedly into the mirror in their bedroom.",
    "This person in a medium shot, with a noticeably large, overweight build, looking unhappy while eating junk food on an outdoor bench.",
    "A medium-long portrait of this person, very overweight and with a sad expression, watching television in a poorly lit living room.",
    "Medium-long photograph of this person with an exaggeratedly heavy build and a discontented face in their bedroom.",
];

const MUSCULAR_PROMPTS: [&str; 5] = [
    "Medium-long shot of this person shirtless, an exaggeratedly muscular bodybuilder physique, smiling confidently in a modern, well-equipped gym.",
    "Waist-up photo of this person bare-chested, taking a smiling selfie in front of the gym mirror.",
    "This person shirtless in a medium-long shot, with extremely large, defined muscles, laughing while training at an outdoor calisthenics park.",
    "A medium-long portrait of this person shirtless, proudly showing off their physique with a big smile in the living room of their home.",
    "Photograph of this person in a medium-long shot, bare-chested, with a euphoric expression in a gym locker room after training.",
];

const BUILTIN_PROMPTS: [(Category, &[&str]); 3] = [
    (Category::Underweight, &UNDERWEIGHT_PROMPTS),
    (Category::Overweight, &OVERWEIGHT_PROMPTS),
    (Category::Muscular, &MUSCULAR_PROMPTS),
];

/// Ordered, immutable sequence of prompts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptCatalog {
    prompts: Vec<PromptSpec>,
}

impl PromptCatalog {
    /// The reference pack: 15 prompts, 5 per category, in category order.
    pub fn builtin() -> Self {
        let prompts = BUILTIN_PROMPTS
            .iter()
            .flat_map(|(category, texts)| {
                texts.iter().map(|text| PromptSpec::new(*text, *category))
            })
            .collect();
        PromptCatalog { prompts }
    }

    pub fn from_prompts(prompts: Vec<PromptSpec>) -> Self {
        PromptCatalog { prompts }
    }

    /// Parse a JSON array of `{ "text": ..., "category": ... }` objects.
    pub fn from_json_str(raw: &str) -> AppResult<Self> {
        let prompts: Vec<PromptSpec> = serde_json::from_str(raw)
            .map_err(|e| AppError::Catalog(format!("Failed to parse catalog JSON: {}", e)))?;
        if prompts.is_empty() {
            return Err(AppError::Catalog("Catalog must contain at least one prompt".to_string()));
        }
        if let Some(blank) = prompts.iter().position(|p| p.text.trim().is_empty()) {
            return Err(AppError::Catalog(format!("Prompt #{} has empty text", blank + 1)));
        }
        Ok(PromptCatalog { prompts })
    }

    pub async fn from_json_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            AppError::Catalog(format!("Failed to read catalog file {}: {}", path.display(), e))
        })?;
        let catalog = Self::from_json_str(&raw)?;
        tracing::info!("Loaded {} prompts from {}", catalog.len(), path.display());
        Ok(catalog)
    }

    /// Builtin catalog unless an override path is given.
    pub async fn load(path: Option<&str>) -> AppResult<Self> {
        match path {
            Some(p) => Self::from_json_file(p).await,
            None => Ok(Self::builtin()),
        }
    }

    pub fn prompts(&self) -> &[PromptSpec] {
        &self.prompts
    }

    pub fn len(&self) -> usize {
        self.prompts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prompts.is_empty()
    }

    /// Consecutive batches of `size` prompts; the last may be shorter.
    pub fn batches(&self, size: usize) -> std::slice::Chunks<'_, PromptSpec> {
        self.prompts.chunks(size.max(1))
    }

    pub fn batch_count(&self, size: usize) -> usize {
        self.prompts.len().div_ceil(size.max(1))
    }

    /// Number of prompts per category, in `Category::ALL` order.
    pub fn count_by_category(&self) -> Vec<(Category, usize)> {
        Category::ALL
            .iter()
            .map(|c| (*c, self.prompts.iter().filter(|p| p.category == *c).count()))
            .collect()
    }
}

impl Default for PromptCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_has_five_per_category_in_order() {
        let catalog = PromptCatalog::builtin();
        assert_eq!(catalog.len(), 15);
        assert_eq!(
            catalog.count_by_category(),
            vec![(Category::Underweight, 5), (Category::Overweight, 5), (Category::Muscular, 5)]
        );
        let first_batch: Vec<_> =
            catalog.batches(5).next().unwrap().iter().map(|p| p.category).collect();
        assert_eq!(first_batch, vec![Category::Underweight; 5]);
    }

    #[test]
    fn batches_keep_order_and_short_tail() {
        let prompts =
            (0..7).map(|i| PromptSpec::new(format!("p{}", i), Category::Muscular)).collect();
        let catalog = PromptCatalog::from_prompts(prompts);
        let sizes: Vec<usize> = catalog.batches(3).map(|b| b.len()).collect();
        assert_eq!(sizes, vec![3, 3, 1]);
        assert_eq!(catalog.batch_count(3), 3);
        assert_eq!(catalog.batches(3).last().unwrap()[0].text, "p6");
    }

    #[test]
    fn parses_json_catalog() {
        let raw = r#"[{"text":"a","category":"overweight"},{"text":"b","category":"muscular"}]"#;
        let catalog = PromptCatalog::from_json_str(raw).unwrap();
        assert_eq!(catalog.prompts()[0], PromptSpec::new("a", Category::Overweight));
        assert_eq!(catalog.prompts()[1].category, Category::Muscular);
    }

    #[test]
    fn rejects_empty_or_unknown_category() {
        assert!(matches!(PromptCatalog::from_json_str("[]"), Err(AppError::Catalog(_))));
        let raw = r#"[{"text":"a","category":"sideways"}]"#;
        assert!(matches!(PromptCatalog::from_json_str(raw), Err(AppError::Catalog(_))));
        let raw = r#"[{"text":"  ","category":"muscular"}]"#;
        assert!(matches!(PromptCatalog::from_json_str(raw), Err(AppError::Catalog(_))));
    }

    #[tokio::test]
    async fn loads_catalog_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        std::fs::write(&path, r#"[{"text":"x","category":"underweight"}]"#).unwrap();
        let catalog = PromptCatalog::load(Some(path.to_str().unwrap())).await.unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(PromptCatalog::load(None).await.unwrap().len(), 15);
    }
}
