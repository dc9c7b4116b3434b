//! Data release catalogue and resolver.
//!
//! A [`ReleaseDescriptor`] names the backend family, tables and schema
//! version behind one externally visible release name. The catalogue is
//! built once at startup and only read afterwards.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::error::{FederationError, FederationResult};

/// Pseudo-release resolving to the configured current release.
pub const LATEST_ALIAS: &str = "latest";

/// Release `latest` points to unless configured otherwise.
pub const DEFAULT_LATEST: &str = "dr8";

/// Which backend family holds a release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// Point/circle native relational backend with exact containment predicates
    Analytic,
    /// Hex-cell indexed columnar backend, coarse index then exact refinement
    Indexed,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Analytic => f.write_str("analytic"),
            BackendKind::Indexed => f.write_str("indexed"),
        }
    }
}

/// Observation columns a schema version may expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObservationField {
    Mjd,
    Mag,
    MagErr,
    ClrCoeff,
    CatFlags,
}

/// Schema generation of a release; fixes the observation output whitelist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaVersion {
    V1,
    V2,
    V3,
}

impl SchemaVersion {
    pub fn observation_fields(self) -> &'static [ObservationField] {
        use ObservationField::*;
        match self {
            SchemaVersion::V1 | SchemaVersion::V2 => &[Mjd, Mag, MagErr, ClrCoeff, CatFlags],
            SchemaVersion::V3 => &[Mjd, Mag, MagErr, ClrCoeff],
        }
    }

    pub fn exposes(self, field: ObservationField) -> bool {
        self.observation_fields().contains(&field)
    }
}

/// Row-level quality cuts applied inside the backend queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QualityCuts {
    /// Only observations with `catflags = 0`
    pub clean_flags_only: bool,
    /// Only observations with `magerr > 0`
    pub positive_magerr_only: bool,
    /// Only summaries with `ngoodobs > 0`
    pub observed_summaries_only: bool,
}

impl QualityCuts {
    /// SQL conditions on the observation table, in a fixed order.
    pub fn observation_conditions(&self) -> Vec<&'static str> {
        let mut conditions = Vec::new();
        if self.clean_flags_only {
            conditions.push("catflags = 0");
        }
        if self.positive_magerr_only {
            conditions.push("magerr > 0");
        }
        conditions
    }

    /// SQL conditions on the summary table.
    pub fn summary_conditions(&self) -> Vec<&'static str> {
        if self.observed_summaries_only {
            vec!["ngoodobs > 0"]
        } else {
            Vec::new()
        }
    }
}

/// Static description of one data release.
#[derive(Debug, Clone, PartialEq)]
pub struct ReleaseDescriptor {
    pub name: String,
    pub backend: BackendKind,
    pub observation_table: String,
    pub summary_table: String,
    pub short_summary_table: Option<String>,
    pub schema: SchemaVersion,
    pub quality: QualityCuts,
}

impl ReleaseDescriptor {
    /// ZTF DR1 on the relational backend; light curves are pre-filtered.
    pub fn dr1() -> Self {
        Self {
            name: "dr1".to_string(),
            backend: BackendKind::Analytic,
            observation_table: "dr1_good_lc".to_string(),
            summary_table: "dr1_meta".to_string(),
            short_summary_table: None,
            schema: SchemaVersion::V1,
            quality: QualityCuts::default(),
        }
    }

    /// ZTF DR2 as served by the second API generation.
    pub fn dr2_legacy() -> Self {
        Self {
            name: "dr2".to_string(),
            backend: BackendKind::Indexed,
            observation_table: "dr2".to_string(),
            summary_table: "dr2_meta".to_string(),
            short_summary_table: None,
            schema: SchemaVersion::V2,
            quality: QualityCuts {
                clean_flags_only: true,
                ..Default::default()
            },
        }
    }

    /// A release of the current schema generation on the indexed backend.
    pub fn indexed(name: &str, with_short_summary: bool) -> Self {
        Self {
            name: name.to_string(),
            backend: BackendKind::Indexed,
            observation_table: name.to_string(),
            summary_table: format!("{}_meta", name),
            short_summary_table: with_short_summary.then(|| format!("{}_meta_short", name)),
            schema: SchemaVersion::V3,
            quality: QualityCuts {
                clean_flags_only: true,
                positive_magerr_only: true,
                observed_summaries_only: true,
            },
        }
    }
}

/// Which release names are exposed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Availability {
    #[default]
    Everything,
    Only(HashSet<String>),
}

impl Availability {
    pub fn allows(&self, name: &str) -> bool {
        match self {
            Availability::Everything => true,
            Availability::Only(names) => names.contains(name),
        }
    }
}

impl FromStr for Availability {
    type Err = FederationError;

    /// Parse `all` or a `:`-separated list of release names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let names: HashSet<String> = s
            .to_lowercase()
            .split(':')
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .collect();
        if names.is_empty() {
            return Err(FederationError::configuration(
                "AVAILABLE_DRS should name at least one release or be \"all\"",
            ));
        }
        if names.contains("all") {
            return Ok(Availability::Everything);
        }
        Ok(Availability::Only(names))
    }
}

/// Release catalogue for the multi-release schema generation.
#[derive(Debug, Clone)]
pub struct ReleaseCatalogue {
    releases: Vec<ReleaseDescriptor>,
    latest: String,
    availability: Availability,
}

impl Default for ReleaseCatalogue {
    fn default() -> Self {
        Self::standard()
    }
}

impl ReleaseCatalogue {
    /// DR2, DR3, DR4 and DR8 with `latest` pointing at DR8.
    pub fn standard() -> Self {
        Self {
            releases: vec![
                ReleaseDescriptor::indexed("dr2", true),
                ReleaseDescriptor::indexed("dr3", true),
                ReleaseDescriptor::indexed("dr4", false),
                ReleaseDescriptor::indexed("dr8", false),
            ],
            latest: DEFAULT_LATEST.to_string(),
            availability: Availability::Everything,
        }
    }

    /// Build a catalogue; `latest` must name one of `releases`.
    pub fn new(releases: Vec<ReleaseDescriptor>, latest: &str) -> FederationResult<Self> {
        if !releases.iter().any(|r| r.name == latest) {
            return Err(FederationError::configuration(format!(
                "\"{}\" cannot be the latest release, it is not in the catalogue",
                latest
            )));
        }
        Ok(Self {
            releases,
            latest: latest.to_string(),
            availability: Availability::Everything,
        })
    }

    /// Re-point the `latest` alias.
    pub fn with_latest(self, latest: &str) -> FederationResult<Self> {
        let availability = self.availability;
        Self::new(self.releases, latest).map(|c| c.with_availability(availability))
    }

    pub fn with_availability(mut self, availability: Availability) -> Self {
        self.availability = availability;
        self
    }

    /// Concrete release the alias currently points at.
    pub fn latest(&self) -> &str {
        &self.latest
    }

    fn canonical<'a>(&'a self, name: &'a str) -> &'a str {
        if name == LATEST_ALIAS {
            &self.latest
        } else {
            name
        }
    }

    /// Resolve an external release name, following the `latest` alias.
    pub fn resolve(&self, name: &str) -> FederationResult<&ReleaseDescriptor> {
        let concrete = self.canonical(name);
        if !self.availability.allows(concrete) {
            return Err(FederationError::unknown_release(name));
        }
        self.releases
            .iter()
            .find(|r| r.name == concrete)
            .ok_or_else(|| FederationError::unknown_release(name))
    }

    pub fn observation_table(&self, name: &str) -> FederationResult<&str> {
        self.resolve(name).map(|r| r.observation_table.as_str())
    }

    pub fn summary_table(&self, name: &str) -> FederationResult<&str> {
        self.resolve(name).map(|r| r.summary_table.as_str())
    }

    /// `None` means the release has no short-window enrichment, not an error.
    pub fn short_summary_table(&self, name: &str) -> FederationResult<Option<&str>> {
        self.resolve(name).map(|r| r.short_summary_table.as_deref())
    }

    /// Externally visible names in catalogue order, alias last.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .releases
            .iter()
            .map(|r| r.name.as_str())
            .filter(|n| self.availability.allows(n))
            .collect();
        if self.availability.allows(&self.latest) {
            names.push(LATEST_ALIAS);
        }
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_latest_alias() {
        let catalogue = ReleaseCatalogue::standard();
        let latest = catalogue.resolve("latest").unwrap();
        assert_eq!(latest.name, "dr8");
        assert_eq!(catalogue.observation_table("latest").unwrap(), "dr8");
        assert_eq!(catalogue.summary_table("latest").unwrap(), "dr8_meta");
    }

    #[test]
    fn test_unknown_release() {
        let catalogue = ReleaseCatalogue::standard();
        let err = catalogue.resolve("dr13").unwrap_err();
        assert!(matches!(err, FederationError::UnknownRelease { .. }));
        assert!(catalogue.resolve("DR8").is_err());
        assert!(catalogue.summary_table("dr1").is_err());
    }

    #[test]
    fn test_short_summary_tables() {
        let catalogue = ReleaseCatalogue::standard();
        assert_eq!(
            catalogue.short_summary_table("dr2").unwrap(),
            Some("dr2_meta_short")
        );
        assert_eq!(
            catalogue.short_summary_table("dr3").unwrap(),
            Some("dr3_meta_short")
        );
        assert_eq!(catalogue.short_summary_table("dr4").unwrap(), None);
        assert_eq!(catalogue.short_summary_table("latest").unwrap(), None);
    }

    #[test]
    fn test_list_includes_alias() {
        let catalogue = ReleaseCatalogue::standard();
        assert_eq!(catalogue.list(), vec!["dr2", "dr3", "dr4", "dr8", "latest"]);
    }

    #[test]
    fn test_availability_restricts_catalogue() {
        let catalogue = ReleaseCatalogue::standard()
            .with_availability("dr2:dr3".parse().unwrap());
        assert!(catalogue.resolve("dr2").is_ok());
        assert!(catalogue.resolve("dr8").is_err());
        // alias follows its target
        assert!(catalogue.resolve("latest").is_err());
        assert_eq!(catalogue.list(), vec!["dr2", "dr3"]);
    }

    #[test]
    fn test_availability_parsing() {
        assert_eq!("all".parse::<Availability>().unwrap(), Availability::Everything);
        assert_eq!(
            "dr2:ALL".parse::<Availability>().unwrap(),
            Availability::Everything
        );
        assert!("".parse::<Availability>().is_err());
    }

    #[test]
    fn test_with_latest() {
        let catalogue = ReleaseCatalogue::standard().with_latest("dr4").unwrap();
        assert_eq!(catalogue.resolve("latest").unwrap().name, "dr4");
        assert!(ReleaseCatalogue::standard().with_latest("dr99").is_err());
    }

    #[test]
    fn test_schema_whitelists() {
        assert!(SchemaVersion::V1.exposes(ObservationField::CatFlags));
        assert!(SchemaVersion::V2.exposes(ObservationField::CatFlags));
        assert!(!SchemaVersion::V3.exposes(ObservationField::CatFlags));
        assert!(SchemaVersion::V3.exposes(ObservationField::ClrCoeff));
    }

    #[test]
    fn test_quality_conditions() {
        let v3 = ReleaseDescriptor::indexed("dr8", false).quality;
        assert_eq!(v3.observation_conditions(), vec!["catflags = 0", "magerr > 0"]);
        assert_eq!(v3.summary_conditions(), vec!["ngoodobs > 0"]);
        let v2 = ReleaseDescriptor::dr2_legacy().quality;
        assert_eq!(v2.observation_conditions(), vec!["catflags = 0"]);
        assert!(v2.summary_conditions().is_empty());
        assert!(ReleaseDescriptor::dr1().quality.observation_conditions().is_empty());
    }

    #[test]
    fn test_fixed_descriptors() {
        let dr1 = ReleaseDescriptor::dr1();
        assert_eq!(dr1.backend, BackendKind::Analytic);
        assert_eq!(dr1.observation_table, "dr1_good_lc");
        let dr2 = ReleaseDescriptor::dr2_legacy();
        assert_eq!(dr2.backend, BackendKind::Indexed);
        assert_eq!(dr2.schema, SchemaVersion::V2);
        assert!(dr2.quality.clean_flags_only);
        assert!(!dr2.quality.positive_magerr_only);
    }
}
