//! Result-set modes and the facet profile each one exposes.
//!
//! A single engine serves every mode; the mode only selects which categories
//! are counted and how the backend names its query.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::facets::FacetCategory;

/// The entity type a list view is showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultMode {
    Scenes,
    Performers,
    Studios,
    Galleries,
    Groups,
    Tags,
}

impl ResultMode {
    /// Every mode, in declaration order.
    pub const ALL: [ResultMode; 6] = [
        ResultMode::Scenes,
        ResultMode::Performers,
        ResultMode::Studios,
        ResultMode::Galleries,
        ResultMode::Groups,
        ResultMode::Tags,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResultMode::Scenes => "scenes",
            ResultMode::Performers => "performers",
            ResultMode::Studios => "studios",
            ResultMode::Galleries => "galleries",
            ResultMode::Groups => "groups",
            ResultMode::Tags => "tags",
        }
    }

    /// Static facet profile for this mode.
    pub fn profile(&self) -> &'static ModeProfile {
        match self {
            ResultMode::Scenes => &SCENES,
            ResultMode::Performers => &PERFORMERS,
            ResultMode::Studios => &STUDIOS,
            ResultMode::Galleries => &GALLERIES,
            ResultMode::Groups => &GROUPS,
            ResultMode::Tags => &TAGS,
        }
    }
}

impl fmt::Display for ResultMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResultMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| Error::InvalidInput(format!("unknown result mode: {s}")))
    }
}

/// Countable categories and backend names for one mode.
#[derive(Debug)]
pub struct ModeProfile {
    pub mode: ResultMode,
    /// Categories counted by this mode, eager and lazy.
    pub categories: &'static [FacetCategory],
    /// GraphQL input type of the mode's filter object.
    pub filter_type: &'static str,
    /// Root field of the aggregate facet query.
    pub facets_field: &'static str,
    /// Root field of the list query used for per-entity counts.
    pub find_field: &'static str,
}

impl ModeProfile {
    /// Whether the mode counts `category` at all.
    pub fn supports(&self, category: FacetCategory) -> bool {
        self.categories.contains(&category)
    }

    /// Categories fetched with every aggregate query.
    pub fn eager_categories(&self) -> impl Iterator<Item = FacetCategory> + '_ {
        self.categories.iter().copied().filter(|c| !c.is_lazy())
    }

    /// Categories fetched only once their section is expanded.
    pub fn lazy_categories(&self) -> impl Iterator<Item = FacetCategory> + '_ {
        self.categories.iter().copied().filter(|c| c.is_lazy())
    }
}

static SCENES: ModeProfile = ModeProfile {
    mode: ResultMode::Scenes,
    categories: &[
        FacetCategory::Tags,
        FacetCategory::Performers,
        FacetCategory::Studios,
        FacetCategory::Groups,
        FacetCategory::PerformerTags,
        FacetCategory::Captions,
        FacetCategory::Resolutions,
        FacetCategory::Orientations,
        FacetCategory::Ratings,
        FacetCategory::Organized,
        FacetCategory::Interactive,
    ],
    filter_type: "SceneFilterType",
    facets_field: "sceneFacets",
    find_field: "findScenes",
};

static PERFORMERS: ModeProfile = ModeProfile {
    mode: ResultMode::Performers,
    categories: &[
        FacetCategory::Tags,
        FacetCategory::Studios,
        FacetCategory::Genders,
        FacetCategory::Countries,
        FacetCategory::Ratings,
        FacetCategory::Favorite,
    ],
    filter_type: "PerformerFilterType",
    facets_field: "performerFacets",
    find_field: "findPerformers",
};

static STUDIOS: ModeProfile = ModeProfile {
    mode: ResultMode::Studios,
    categories: &[
        FacetCategory::Tags,
        FacetCategory::Ratings,
        FacetCategory::Favorite,
    ],
    filter_type: "StudioFilterType",
    facets_field: "studioFacets",
    find_field: "findStudios",
};

static GALLERIES: ModeProfile = ModeProfile {
    mode: ResultMode::Galleries,
    categories: &[
        FacetCategory::Tags,
        FacetCategory::Performers,
        FacetCategory::Studios,
        FacetCategory::PerformerTags,
        FacetCategory::Ratings,
        FacetCategory::Organized,
    ],
    filter_type: "GalleryFilterType",
    facets_field: "galleryFacets",
    find_field: "findGalleries",
};

static GROUPS: ModeProfile = ModeProfile {
    mode: ResultMode::Groups,
    categories: &[
        FacetCategory::Tags,
        FacetCategory::Performers,
        FacetCategory::Studios,
        FacetCategory::Ratings,
    ],
    filter_type: "GroupFilterType",
    facets_field: "groupFacets",
    find_field: "findGroups",
};

static TAGS: ModeProfile = ModeProfile {
    mode: ResultMode::Tags,
    categories: &[FacetCategory::ParentTags, FacetCategory::Favorite],
    filter_type: "TagFilterType",
    facets_field: "tagFacets",
    find_field: "findTags",
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_mode_has_matching_profile() {
        for mode in ResultMode::ALL {
            assert_eq!(mode.profile().mode, mode);
            assert!(!mode.profile().categories.is_empty());
        }
    }

    #[test]
    fn test_scene_profile_splits_lazy_categories() {
        let profile = ResultMode::Scenes.profile();
        let lazy: Vec<_> = profile.lazy_categories().collect();
        assert_eq!(
            lazy,
            vec![FacetCategory::PerformerTags, FacetCategory::Captions]
        );
        assert!(profile.eager_categories().all(|c| !c.is_lazy()));
        assert!(profile.supports(FacetCategory::Tags));
        assert!(!profile.supports(FacetCategory::Genders));
    }

    #[test]
    fn test_performer_profile_has_no_lazy_categories() {
        assert_eq!(ResultMode::Performers.profile().lazy_categories().count(), 0);
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!("galleries".parse::<ResultMode>().unwrap(), ResultMode::Galleries);
        assert!("images".parse::<ResultMode>().is_err());
    }
}
