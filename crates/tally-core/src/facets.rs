//! Facet categories: the countable dimensions of a result set.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// How counts for a category are keyed and shaped on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FacetKind {
    /// Entities keyed by id and carrying a display label (tags, studios).
    Labeled,
    /// Raw enum members (resolutions, orientations, genders).
    Enum,
    /// Small integer buckets (ratings).
    Rating,
    /// A true/false pair (organized, favorite).
    Boolean,
}

/// A countable dimension of a result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FacetCategory {
    Tags,
    ParentTags,
    Performers,
    Studios,
    Groups,
    /// Tags attached to performers appearing in the filtered results.
    PerformerTags,
    /// Caption languages.
    Captions,
    Resolutions,
    Orientations,
    Ratings,
    Genders,
    Countries,
    Organized,
    Interactive,
    Favorite,
}

impl FacetCategory {
    /// Every category, in declaration order.
    pub const ALL: [FacetCategory; 15] = [
        FacetCategory::Tags,
        FacetCategory::ParentTags,
        FacetCategory::Performers,
        FacetCategory::Studios,
        FacetCategory::Groups,
        FacetCategory::PerformerTags,
        FacetCategory::Captions,
        FacetCategory::Resolutions,
        FacetCategory::Orientations,
        FacetCategory::Ratings,
        FacetCategory::Genders,
        FacetCategory::Countries,
        FacetCategory::Organized,
        FacetCategory::Interactive,
        FacetCategory::Favorite,
    ];

    /// Wire name, used both as response key and in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            FacetCategory::Tags => "tags",
            FacetCategory::ParentTags => "parent_tags",
            FacetCategory::Performers => "performers",
            FacetCategory::Studios => "studios",
            FacetCategory::Groups => "groups",
            FacetCategory::PerformerTags => "performer_tags",
            FacetCategory::Captions => "captions",
            FacetCategory::Resolutions => "resolutions",
            FacetCategory::Orientations => "orientations",
            FacetCategory::Ratings => "ratings",
            FacetCategory::Genders => "genders",
            FacetCategory::Countries => "countries",
            FacetCategory::Organized => "organized",
            FacetCategory::Interactive => "interactive",
            FacetCategory::Favorite => "favorite",
        }
    }

    /// Shape of the category's counts.
    pub fn kind(&self) -> FacetKind {
        match self {
            FacetCategory::Tags
            | FacetCategory::ParentTags
            | FacetCategory::Performers
            | FacetCategory::Studios
            | FacetCategory::Groups
            | FacetCategory::PerformerTags => FacetKind::Labeled,
            FacetCategory::Captions
            | FacetCategory::Resolutions
            | FacetCategory::Orientations
            | FacetCategory::Genders
            | FacetCategory::Countries => FacetKind::Enum,
            FacetCategory::Ratings => FacetKind::Rating,
            FacetCategory::Organized | FacetCategory::Interactive | FacetCategory::Favorite => {
                FacetKind::Boolean
            }
        }
    }

    /// Whether the category is an expensive aggregate fetched only on demand.
    pub fn is_lazy(&self) -> bool {
        matches!(self, FacetCategory::PerformerTags | FacetCategory::Captions)
    }

    /// Name of the filter criterion that constrains on this category.
    pub fn criterion_field(&self) -> &'static str {
        match self {
            FacetCategory::Tags => "tags",
            FacetCategory::ParentTags => "parents",
            FacetCategory::Performers => "performers",
            FacetCategory::Studios => "studios",
            FacetCategory::Groups => "groups",
            FacetCategory::PerformerTags => "performer_tags",
            FacetCategory::Captions => "captions",
            FacetCategory::Resolutions => "resolution",
            FacetCategory::Orientations => "orientation",
            FacetCategory::Ratings => "rating100",
            FacetCategory::Genders => "gender",
            FacetCategory::Countries => "country",
            FacetCategory::Organized => "organized",
            FacetCategory::Interactive => "interactive",
            FacetCategory::Favorite => "filter_favorites",
        }
    }

    /// Look up the category constrained by a criterion field.
    pub fn from_criterion_field(field: &str) -> Option<FacetCategory> {
        Self::ALL
            .into_iter()
            .find(|c| c.criterion_field() == field)
    }
}

impl fmt::Display for FacetCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FacetCategory {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| Error::InvalidInput(format!("unknown facet category: {s}")))
    }
}
