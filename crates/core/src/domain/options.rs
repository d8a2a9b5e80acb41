// Analysis options captured at submission time

use crate::domain::error::{DomainError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Maximum length (chars) of any free-text context field
pub const MAX_CONTEXT_FIELD_CHARS: usize = 4000;

/// Maximum number of focus areas per request
pub const MAX_FOCUS_AREAS: usize = 12;

/// Detail tier controlling frame count, resolution and token budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetailTier {
    Low,
    #[default]
    Normal,
    High,
}

/// Resource profile of a tier. Always bounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TierProfile {
    pub frame_count: usize,
    pub frame_width: u32,
    pub token_budget: u32,
}

impl DetailTier {
    pub fn profile(self) -> TierProfile {
        match self {
            DetailTier::Low => TierProfile {
                frame_count: 4,
                frame_width: 512,
                token_budget: 600,
            },
            DetailTier::Normal => TierProfile {
                frame_count: 8,
                frame_width: 768,
                token_budget: 1200,
            },
            DetailTier::High => TierProfile {
                frame_count: 12,
                frame_width: 1024,
                token_budget: 2000,
            },
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DetailTier::Low => "low",
            DetailTier::Normal => "normal",
            DetailTier::High => "high",
        }
    }
}

impl std::fmt::Display for DetailTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DetailTier {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(DetailTier::Low),
            "normal" | "medium" => Ok(DetailTier::Normal),
            "high" => Ok(DetailTier::High),
            other => Err(DomainError::ValidationError(format!(
                "Unknown detail tier '{}' (expected low, normal or high)",
                other
            ))),
        }
    }
}

/// Free-form context forwarded to the analyzer. Opaque to the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub focus_areas: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

/// Options snapshot of one submission
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisOptions {
    #[serde(default)]
    pub tier: DetailTier,
    #[serde(default)]
    pub context: AnalysisContext,
    /// MIME type declared by the uploader; checked, but not part of the cache key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

impl AnalysisOptions {
    pub fn with_tier(tier: DetailTier) -> Self {
        Self {
            tier,
            ..Default::default()
        }
    }

    /// Reject oversized or malformed options before any work is done
    pub fn validate(&self) -> Result<()> {
        let ctx = &self.context;
        let fields = [
            ("game", ctx.game.as_deref()),
            ("bio", ctx.bio.as_deref()),
            ("notes", ctx.notes.as_deref()),
        ];
        for (name, value) in fields {
            if let Some(v) = value {
                check_len(name, v)?;
            }
        }

        if ctx.focus_areas.len() > MAX_FOCUS_AREAS {
            return Err(DomainError::ValidationError(format!(
                "Too many focus areas: {} (max {})",
                ctx.focus_areas.len(),
                MAX_FOCUS_AREAS
            )));
        }
        for area in &ctx.focus_areas {
            check_len("focus area", area)?;
        }
        for (k, v) in &ctx.extra {
            check_len(k, v)?;
        }

        if let Some(ct) = &self.content_type {
            if !ct.trim().to_ascii_lowercase().starts_with("video/") {
                return Err(DomainError::ValidationError(format!(
                    "Declared content type '{}' is not a video type",
                    ct
                )));
            }
        }
        Ok(())
    }

    /// Canonical bytes of everything that changes the analysis output.
    ///
    /// Length-prefixed so that field boundaries cannot be forged by content.
    pub fn key_material(&self) -> Vec<u8> {
        let ctx = &self.context;
        let mut out = Vec::with_capacity(256);
        push_field(&mut out, self.tier.as_str());
        push_field(&mut out, ctx.game.as_deref().unwrap_or(""));
        push_field(&mut out, ctx.bio.as_deref().unwrap_or(""));
        push_field(&mut out, ctx.notes.as_deref().unwrap_or(""));
        push_field(&mut out, &ctx.focus_areas.len().to_string());
        for area in &ctx.focus_areas {
            push_field(&mut out, area);
        }
        for (k, v) in &ctx.extra {
            push_field(&mut out, k);
            push_field(&mut out, v);
        }
        out
    }
}

fn check_len(name: &str, value: &str) -> Result<()> {
    let len = value.chars().count();
    if len > MAX_CONTEXT_FIELD_CHARS {
        return Err(DomainError::ValidationError(format!(
            "Context field '{}' too long: {} chars (max {})",
            name, len, MAX_CONTEXT_FIELD_CHARS
        )));
    }
    Ok(())
}

fn push_field(out: &mut Vec<u8>, value: &str) {
    out.extend_from_slice(value.len().to_string().as_bytes());
    out.push(b':');
    out.extend_from_slice(value.as_bytes());
    out.push(b';');
}
