//! Application configuration structures.
//!
//! Everything that tends to drift with the source's markup (label
//! spellings, classification vocabularies, file naming patterns, key
//! aliases) lives here as data so it can be edited in `config.toml`
//! without touching code.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::Field;

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Output locations
    #[serde(default)]
    pub paths: PathsConfig,

    /// Run limits, pacing and resume behavior
    #[serde(default)]
    pub extract: ExtractConfig,

    /// HTML page source settings
    #[serde(default)]
    pub source: SourceConfig,

    /// Label synonym tables
    #[serde(default)]
    pub normalizer: NormalizerConfig,

    /// Classification rule tables
    #[serde(default)]
    pub classifier: ClassifierConfig,

    /// Input discovery profiles
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Record matching, enrichment and deduplication
    #[serde(default)]
    pub reconcile: ReconcileConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Apply environment overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Apply environment-style overrides from an arbitrary lookup.
    ///
    /// Unparseable values are logged and ignored.
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = lookup("OUT_DIR").filter(|v| !v.trim().is_empty()) {
            self.paths.output_dir = dir.trim().to_string();
        }
        env_number(&lookup, "HARVEST_MAX_EVENTS", &mut self.extract.max_events);
        env_number(
            &lookup,
            "HARVEST_MAX_PARTICIPANTS",
            &mut self.extract.max_participants,
        );
        env_number(&lookup, "HARVEST_DELAY_MS", &mut self.extract.request_delay_ms);
        env_number(
            &lookup,
            "HARVEST_TIMEOUT_SECS",
            &mut self.extract.fetch_timeout_secs,
        );
        env_number(&lookup, "HARVEST_RETRIES", &mut self.extract.max_retries);

        if let Some(raw) = lookup("HARVEST_RESUME") {
            match parse_bool(&raw) {
                Some(resume) => self.extract.resume = resume,
                None => log::warn!("Ignoring HARVEST_RESUME={raw:?}: not a boolean"),
            }
        }
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.paths.output_dir.trim().is_empty() {
            return Err(AppError::validation("paths.output_dir is empty"));
        }
        if self.extract.max_slots == 0 {
            return Err(AppError::validation("extract.max_slots must be > 0"));
        }
        if self.extract.fetch_timeout_secs == 0 {
            return Err(AppError::validation(
                "extract.fetch_timeout_secs must be > 0",
            ));
        }
        if self.normalizer.fields.is_empty() {
            return Err(AppError::validation("normalizer.fields is empty"));
        }
        if self.normalizer.date_labels.is_empty() || self.normalizer.rounds_labels.is_empty() {
            return Err(AppError::validation(
                "normalizer.date_labels and normalizer.rounds_labels must not be empty",
            ));
        }
        if self.classifier.grades.is_empty()
            || self.classifier.categories.is_empty()
            || self.classifier.extras.is_empty()
        {
            return Err(AppError::validation("classifier rule tables must not be empty"));
        }
        if self.reconcile.dedup_keys.iter().any(|k| k.is_empty()) {
            return Err(AppError::validation(
                "reconcile.dedup_keys must not contain an empty key set",
            ));
        }
        Ok(())
    }
}

fn env_number<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    target: &mut T,
) {
    if let Some(raw) = lookup(key) {
        match raw.trim().parse() {
            Ok(value) => *target = value,
            Err(_) => log::warn!("Ignoring {key}={raw:?}: not a number"),
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" | "si" | "sí" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

/// Output locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory for sinks, checkpoint and final document
    #[serde(default = "defaults::output_dir")]
    pub output_dir: String,

    /// Checkpoint file (relative paths resolve against `output_dir`)
    #[serde(default = "defaults::checkpoint_file")]
    pub checkpoint_file: String,

    /// Final reconciled document (relative paths resolve against `output_dir`)
    #[serde(default = "defaults::final_output")]
    pub final_output: String,

    /// File-name stem of the entity-level sink
    #[serde(default = "defaults::events_stem")]
    pub events_stem: String,

    /// File-name stem of the participant-level sink
    #[serde(default = "defaults::participants_stem")]
    pub participants_stem: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            output_dir: defaults::output_dir(),
            checkpoint_file: defaults::checkpoint_file(),
            final_output: defaults::final_output(),
            events_stem: defaults::events_stem(),
            participants_stem: defaults::participants_stem(),
        }
    }
}

impl PathsConfig {
    pub fn output_dir(&self) -> PathBuf {
        PathBuf::from(&self.output_dir)
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.resolve(&self.checkpoint_file)
    }

    pub fn final_output_path(&self) -> PathBuf {
        self.resolve(&self.final_output)
    }

    /// Entity-level sink for a run date, e.g. `events_2025-04-12.csv`.
    pub fn events_sink_path(&self, run_date: NaiveDate) -> PathBuf {
        self.dated(&self.events_stem, run_date)
    }

    /// Participant-level sink for a run date.
    pub fn participants_sink_path(&self, run_date: NaiveDate) -> PathBuf {
        self.dated(&self.participants_stem, run_date)
    }

    fn dated(&self, stem: &str, run_date: NaiveDate) -> PathBuf {
        self.output_dir()
            .join(format!("{}_{}.csv", stem, run_date.format("%Y-%m-%d")))
    }

    fn resolve(&self, file: &str) -> PathBuf {
        let path = PathBuf::from(file);
        if path.is_absolute() {
            path
        } else {
            self.output_dir().join(path)
        }
    }
}

/// Run limits, pacing and resume behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractConfig {
    /// Maximum events per run (0 = unlimited)
    #[serde(default)]
    pub max_events: usize,

    /// Maximum participants per event per run (0 = unlimited)
    #[serde(default)]
    pub max_participants: usize,

    /// Delay between page-source calls in milliseconds
    #[serde(default = "defaults::request_delay")]
    pub request_delay_ms: u64,

    /// Bounded wait for a single page-source call
    #[serde(default = "defaults::fetch_timeout")]
    pub fetch_timeout_secs: u64,

    /// Retries after the first failed attempt
    #[serde(default = "defaults::max_retries")]
    pub max_retries: u32,

    /// Linear backoff step between retries in milliseconds
    #[serde(default = "defaults::retry_backoff")]
    pub retry_backoff_ms: u64,

    /// Wall-clock budget per event in seconds (0 = unbounded)
    #[serde(default = "defaults::event_budget")]
    pub event_budget_secs: u64,

    /// Reuse the checkpoint file instead of starting fresh
    #[serde(default = "defaults::resume")]
    pub resume: bool,

    /// Schedule slots kept per participant
    #[serde(default = "defaults::max_slots")]
    pub max_slots: usize,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            max_events: 0,
            max_participants: 0,
            request_delay_ms: defaults::request_delay(),
            fetch_timeout_secs: defaults::fetch_timeout(),
            max_retries: defaults::max_retries(),
            retry_backoff_ms: defaults::retry_backoff(),
            event_budget_secs: defaults::event_budget(),
            resume: defaults::resume(),
            max_slots: defaults::max_slots(),
        }
    }
}

/// HTML page source settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Event listing page
    #[serde(default = "defaults::listing_url")]
    pub listing_url: String,

    /// Cookie header of an already authenticated session
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookie: Option<String>,

    #[serde(default)]
    pub selectors: SourceSelectors,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            listing_url: defaults::listing_url(),
            cookie: None,
            selectors: SourceSelectors::default(),
        }
    }
}

/// CSS selectors used by the HTML page source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSelectors {
    /// One event container on the listing page
    #[serde(default = "defaults::event_row")]
    pub event_row: String,

    #[serde(default = "defaults::event_title")]
    pub event_title: String,

    /// Small-print lines: dates first, organizer second, location by content
    #[serde(default = "defaults::event_meta")]
    pub event_meta: String,

    #[serde(default = "defaults::event_info_link")]
    pub event_info_link: String,

    #[serde(default = "defaults::event_participants_link")]
    pub event_participants_link: String,

    /// One participant entry on the participants page
    #[serde(default = "defaults::participant_row")]
    pub participant_row: String,

    /// Attribute carrying the participant identifier
    #[serde(default = "defaults::participant_id_attr")]
    pub participant_id_attr: String,

    /// Label element inside a participant entry
    #[serde(default = "defaults::label")]
    pub label: String,

    /// Value element inside a participant entry
    #[serde(default = "defaults::value")]
    pub value: String,

    /// Day heading inside a participant entry
    #[serde(default = "defaults::day_header")]
    pub day_header: String,
}

impl Default for SourceSelectors {
    fn default() -> Self {
        Self {
            event_row: defaults::event_row(),
            event_title: defaults::event_title(),
            event_meta: defaults::event_meta(),
            event_info_link: defaults::event_info_link(),
            event_participants_link: defaults::event_participants_link(),
            participant_row: defaults::participant_row(),
            participant_id_attr: defaults::participant_id_attr(),
            label: defaults::label(),
            value: defaults::value(),
            day_header: defaults::day_header(),
        }
    }
}

/// Accepted spellings of one canonical field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSynonyms {
    pub field: Field,
    pub spellings: Vec<String>,
}

/// Label synonym tables for the normalizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizerConfig {
    #[serde(default = "defaults::field_synonyms")]
    pub fields: Vec<FieldSynonyms>,

    /// Labels introducing a schedule slot's date
    #[serde(default = "defaults::date_labels")]
    pub date_labels: Vec<String>,

    /// Labels introducing a schedule slot's rounds-string
    #[serde(default = "defaults::rounds_labels")]
    pub rounds_labels: Vec<String>,

    /// Labels rendered next to schedule entries that carry no slot data
    /// of their own; never resolved, not even by containment
    #[serde(default = "defaults::ignored_labels")]
    pub ignored_labels: Vec<String>,

    /// Regexes (on folded text) recognizing day headers
    #[serde(default = "defaults::day_header_patterns")]
    pub day_header_patterns: Vec<String>,

    /// Shortest label/spelling eligible for containment matching
    #[serde(default = "defaults::min_containment_len")]
    pub min_containment_len: usize,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            fields: defaults::field_synonyms(),
            date_labels: defaults::date_labels(),
            rounds_labels: defaults::rounds_labels(),
            ignored_labels: defaults::ignored_labels(),
            day_header_patterns: defaults::day_header_patterns(),
            min_containment_len: defaults::min_containment_len(),
        }
    }
}

/// One entry of a classification cascade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassRule {
    /// Enumeration code emitted on match
    pub value: String,

    /// Regexes matched case-insensitively against folded text
    pub patterns: Vec<String>,
}

/// A bare token mapped to a grade in federated re-parsing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawGrade {
    pub token: String,
    pub value: String,
}

/// Classification rule tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Valid bare numeric size tokens
    #[serde(default = "defaults::heights")]
    pub heights: Vec<String>,

    #[serde(default = "defaults::category_rules")]
    pub categories: Vec<ClassRule>,

    #[serde(default = "defaults::extra_rules")]
    pub extras: Vec<ClassRule>,

    #[serde(default = "defaults::grade_rules")]
    pub grades: Vec<ClassRule>,

    /// Separator between the grade part and the category part
    #[serde(default = "defaults::split_separator")]
    pub split_separator: String,

    /// Federation prefixes that enable federated re-parsing
    #[serde(default = "defaults::federated_markers")]
    pub federated_markers: Vec<String>,

    /// Separators tried, in order, to find the federated tail
    #[serde(default = "defaults::federated_separators")]
    pub federated_separators: Vec<String>,

    #[serde(default = "defaults::raw_grades")]
    pub raw_grades: Vec<RawGrade>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            heights: defaults::heights(),
            categories: defaults::category_rules(),
            extras: defaults::extra_rules(),
            grades: defaults::grade_rules(),
            split_separator: defaults::split_separator(),
            federated_markers: defaults::federated_markers(),
            federated_separators: defaults::federated_separators(),
            raw_grades: defaults::raw_grades(),
        }
    }
}

/// Where to look for one kind of input, in priority order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryProfile {
    /// Exact file names of a consolidated source
    pub consolidated: Vec<String>,

    /// Regex on file names of dated sources; must capture `date`
    pub dated: String,

    /// Glob patterns on file names of legacy tabular sources
    pub legacy: Vec<String>,

    /// Regex on file names that are never sources
    pub exclude: String,
}

/// Input discovery profiles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    #[serde(default = "defaults::participants_profile")]
    pub participants: DiscoveryProfile,

    #[serde(default = "defaults::event_details_profile")]
    pub event_details: DiscoveryProfile,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            participants: defaults::participants_profile(),
            event_details: defaults::event_details_profile(),
        }
    }
}

/// Copy rule for one descriptive field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichRule {
    /// Column in the primary record
    pub target: String,

    /// Candidate columns in the secondary record, first non-empty wins
    pub sources: Vec<String>,
}

/// Record matching, enrichment and deduplication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// URL columns of primary records
    #[serde(default = "defaults::primary_url_keys")]
    pub primary_url_keys: Vec<String>,

    /// URL columns of secondary records
    #[serde(default = "defaults::secondary_url_keys")]
    pub secondary_url_keys: Vec<String>,

    #[serde(default = "defaults::primary_id_keys")]
    pub primary_id_keys: Vec<String>,

    #[serde(default = "defaults::secondary_id_keys")]
    pub secondary_id_keys: Vec<String>,

    #[serde(default = "defaults::enrich_rules")]
    pub enrich: Vec<EnrichRule>,

    /// Values treated as empty (case-insensitive)
    #[serde(default = "defaults::sentinels")]
    pub sentinels: Vec<String>,

    /// Path segments stripped from the end of URLs before matching
    #[serde(default = "defaults::trailing_segments")]
    pub trailing_segments: Vec<String>,

    /// Composite dedup keys, tried in order
    #[serde(default = "defaults::dedup_keys")]
    pub dedup_keys: Vec<Vec<String>>,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            primary_url_keys: defaults::primary_url_keys(),
            secondary_url_keys: defaults::secondary_url_keys(),
            primary_id_keys: defaults::primary_id_keys(),
            secondary_id_keys: defaults::secondary_id_keys(),
            enrich: defaults::enrich_rules(),
            sentinels: defaults::sentinels(),
            trailing_segments: defaults::trailing_segments(),
            dedup_keys: defaults::dedup_keys(),
        }
    }
}

mod defaults {
    use super::{ClassRule, DiscoveryProfile, EnrichRule, FieldSynonyms, RawGrade};
    use crate::models::Field;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn rule(value: &str, patterns: &[&str]) -> ClassRule {
        ClassRule {
            value: value.to_string(),
            patterns: strings(patterns),
        }
    }

    // Path defaults
    pub fn output_dir() -> String {
        "output".into()
    }
    pub fn checkpoint_file() -> String {
        "checkpoint.json".into()
    }
    pub fn final_output() -> String {
        "participants_final.json".into()
    }
    pub fn events_stem() -> String {
        "events".into()
    }
    pub fn participants_stem() -> String {
        "participants".into()
    }

    // Extract defaults
    pub fn request_delay() -> u64 {
        1000
    }
    pub fn fetch_timeout() -> u64 {
        30
    }
    pub fn max_retries() -> u32 {
        2
    }
    pub fn retry_backoff() -> u64 {
        2000
    }
    pub fn event_budget() -> u64 {
        900
    }
    pub fn resume() -> bool {
        true
    }
    pub fn max_slots() -> usize {
        10
    }

    // Source defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; harvester/0.1)".into()
    }
    pub fn listing_url() -> String {
        "https://www.flowagility.com/zone/events".into()
    }
    pub fn event_row() -> String {
        "div.group.mb-6".into()
    }
    pub fn event_title() -> String {
        "div.font-caption.text-lg".into()
    }
    pub fn event_meta() -> String {
        "div.text-xs".into()
    }
    pub fn event_info_link() -> String {
        "a[href*='/info']".into()
    }
    pub fn event_participants_link() -> String {
        "a[href*='/participants_list']".into()
    }
    pub fn participant_row() -> String {
        "[data-participant-id]".into()
    }
    pub fn participant_id_attr() -> String {
        "data-participant-id".into()
    }
    pub fn label() -> String {
        ".field-label, dt, th".into()
    }
    pub fn value() -> String {
        ".field-value, dd, td".into()
    }
    pub fn day_header() -> String {
        "h3, h4, .day-header".into()
    }

    // Normalizer defaults
    pub fn field_synonyms() -> Vec<FieldSynonyms> {
        let table: [(Field, &[&str]); 12] = [
            (Field::Bib, &["dorsal", "bib", "start", "start number", "dorsal nº"]),
            (
                Field::Handler,
                &["guía", "guia", "guide", "handler", "handler name", "nombre guía", "conductor", "conductora"],
            ),
            (
                Field::Dog,
                &["perro", "dog", "dog name", "nombre perro", "nombre del perro", "chien", "gos"],
            ),
            (Field::Breed, &["raza", "breed", "race", "raça", "raza del perro"]),
            (
                Field::Age,
                &["edad", "edad del perro", "age", "idade", "edat", "fecha de nacimiento", "fecha nacimiento", "date of birth"],
            ),
            (Field::Sex, &["sexo", "sexo del perro", "sex", "género", "genero", "gender", "sexe"]),
            (
                Field::Height,
                &["altura", "height", "height (cm)", "height_cm", "altura (cm)", "alzada", "altura a la cruz", "taille"],
            ),
            (
                Field::License,
                &["licencia", "license", "licence", "nº licencia", "licencia federativa", "llicència"],
            ),
            (Field::Federation, &["federación", "federacion", "federation", "federació", "fed"]),
            (Field::Club, &["club", "club deportivo", "equipo", "team"]),
            (
                Field::PedigreeName,
                &["pedigree", "nombre pedigree", "pedigree name", "nombre de pedigrí", "registered name", "nombre loe"],
            ),
            (Field::Country, &["país", "pais", "country", "nacionalidad", "nación", "nation"]),
        ];

        table
            .into_iter()
            .map(|(field, spellings)| FieldSynonyms {
                field,
                spellings: strings(spellings),
            })
            .collect()
    }
    pub fn date_labels() -> Vec<String> {
        strings(&["fecha", "date", "data", "fecha prueba", "fecha de competición"])
    }
    pub fn rounds_labels() -> Vec<String> {
        strings(&[
            "mangas",
            "manga",
            "rounds",
            "runs",
            "pruebas",
            "prueba",
            "competición",
            "competition",
            "clase",
            "class",
        ])
    }
    pub fn ignored_labels() -> Vec<String> {
        strings(&[
            "grado",
            "grade",
            "level",
            "categoría",
            "categoria",
            "category",
            "size",
            "size class",
            "grado/categoría",
        ])
    }
    pub fn day_header_patterns() -> Vec<String> {
        strings(&[
            r"^(lunes|martes|miercoles|jueves|viernes|sabado|domingo)\b",
            r"^(monday|tuesday|wednesday|thursday|friday|saturday|sunday)\b",
            r"^(dilluns|dimarts|dimecres|dijous|divendres|dissabte|diumenge)\b",
            r"^(dia|day|jornada)\s*\d+\b",
        ])
    }
    pub fn min_containment_len() -> usize {
        3
    }

    // Classifier defaults
    pub fn heights() -> Vec<String> {
        strings(&["20", "30", "40", "50", "60"])
    }
    pub fn category_rules() -> Vec<ClassRule> {
        vec![
            rule("XS", &[r"\bxs\b", r"\bx\s*-?\s*small\b", r"\bextra\s*-?\s*small\b", r"\btoy\b"]),
            rule("S", &[r"\bs\b", r"\bsmall\b", r"\bmini\b", r"\bpequeno\b"]),
            rule("M", &[r"\bm\b", r"\bmedium\b", r"\bmidi\b", r"\bmediano\b"]),
            rule("I", &[r"\bi\b", r"\bintermediate\b", r"\bintermedio\b", r"\binter\b"]),
            rule("L", &[r"\bl\b", r"\blarge\b", r"\bstandard\b", r"\bstd\b", r"\bgrande\b"]),
        ]
    }
    pub fn extra_rules() -> Vec<ClassRule> {
        vec![
            rule("J12", &[r"\bj\s*-?\s*12\b", r"\bu\s*-?\s*12\b", r"\binfantil\b"]),
            rule("J15", &[r"\bj\s*-?\s*15\b", r"\bu\s*-?\s*15\b", r"\bjuvenil\b"]),
            rule("J19", &[r"\bj\s*-?\s*19\b", r"\bu\s*-?\s*19\b", r"\bjunior\s*-?\s*19\b"]),
            rule("JUNIOR", &[r"\bjuniors?\b", r"\bjun\b", r"\bjr\b"]),
            rule("SENIOR", &[r"\bseniors?\b", r"\bveteranos?\b", r"\bveterans?\b", r"\bsen\b", r"\bvet\b"]),
            rule(
                "PARA",
                &[r"\bpara\s*-?\s*agility\b", r"\bparagility\b", r"\(\s*pa(ra)?\s*\)"],
            ),
            rule("MASTER", &[r"\bmasters?\b"]),
            rule("SPECIAL", &[r"\bespecial(es)?\b", r"\bspecial\b"]),
        ]
    }
    pub fn grade_rules() -> Vec<ClassRule> {
        vec![
            rule("G1", &[r"\bg\s*-?\s*1\b", r"\bgrado\s*1\b", r"\bgrade\s*1\b"]),
            rule("G2", &[r"\bg\s*-?\s*2\b", r"\bgrado\s*2\b", r"\bgrade\s*2\b"]),
            rule("G3", &[r"\bg\s*-?\s*3\b", r"\bgrado\s*3\b", r"\bgrade\s*3\b"]),
            rule(
                "PRE",
                &[r"\bpre\s*-?\s*(agility|grado|grade)?\b", r"\bg\s*0\b", r"\bgrado\s*0\b"],
            ),
            rule("PROM", &[r"\bprom(o|ocion|otion)?\b"]),
            rule("COMP", &[r"\bcomp(eticion|etition)?\b"]),
            rule("ROOKIE", &[r"\brookies?\b", r"\bnoveles?\b", r"\bdebutantes?\b"]),
            rule("TRI", &[r"\btri(athlon|atlon)?\s*-?\s*[123]?\b"]),
        ]
    }
    pub fn split_separator() -> String {
        "/".into()
    }
    pub fn federated_markers() -> Vec<String> {
        strings(&["RFEC", "FED"])
    }
    pub fn federated_separators() -> Vec<String> {
        strings(&["-", ":", "|"])
    }
    pub fn raw_grades() -> Vec<RawGrade> {
        [("P", "PROM"), ("C", "COMP"), ("R", "ROOKIE"), ("T", "TRI")]
            .into_iter()
            .map(|(token, value)| RawGrade {
                token: token.to_string(),
                value: value.to_string(),
            })
            .collect()
    }

    // Discovery defaults
    pub fn participants_profile() -> DiscoveryProfile {
        DiscoveryProfile {
            consolidated: strings(&["participants.json", "participantes.json"]),
            dated: r"^(?:participants|participantes)(?:_procesado)?_(?P<date>\d{4}-\d{2}-\d{2})(?:_v\d+)?\.(?:json|csv)$".into(),
            legacy: strings(&["*particip*.csv", "*procesad*.csv"]),
            exclude: r"(?i)progress|events|tmp|test|final".into(),
        }
    }
    pub fn event_details_profile() -> DiscoveryProfile {
        DiscoveryProfile {
            consolidated: strings(&["events_details.json", "02competiciones_detalladas.json", "02info_last.json"]),
            dated: r"^(?:events|01events|02competiciones_detalladas)_(?P<date>\d{4}-\d{2}-\d{2})(?:_v\d+)?\.(?:json|csv)$".into(),
            legacy: strings(&["*events*.json", "*events*.csv", "*competiciones*.json"]),
            exclude: r"(?i)progress|tmp|test".into(),
        }
    }

    // Reconcile defaults
    pub fn primary_url_keys() -> Vec<String> {
        strings(&["event_url", "participants_url", "source_hub_url", "url"])
    }
    pub fn secondary_url_keys() -> Vec<String> {
        strings(&[
            "event_url",
            "url",
            "url_detalle",
            "enlaces.info",
            "enlaces.participantes",
            "participants_url",
        ])
    }
    pub fn primary_id_keys() -> Vec<String> {
        strings(&["event_id", "evento_id"])
    }
    pub fn secondary_id_keys() -> Vec<String> {
        strings(&["event_id", "id", "evento_id"])
    }
    pub fn enrich_rules() -> Vec<EnrichRule> {
        let table: [(&str, &[&str]); 5] = [
            ("event_title", &["event_title", "nombre", "title", "titulo", "informacion_general.titulo"]),
            ("event_organizer", &["event_organizer", "organizacion", "organizer"]),
            ("event_club", &["event_club", "club"]),
            (
                "event_location",
                &["event_location", "lugar", "location", "ubicacion_detallada", "informacion_general.ubicacion_completa"],
            ),
            (
                "event_dates",
                &["event_dates", "fechas", "dates", "fechas_detalladas", "informacion_general.fechas_completas"],
            ),
        ];
        table
            .into_iter()
            .map(|(target, sources)| EnrichRule {
                target: target.to_string(),
                sources: strings(sources),
            })
            .collect()
    }
    pub fn sentinels() -> Vec<String> {
        strings(&["unknown", "desconocido", "n/a", "no disponible", "-"])
    }
    pub fn trailing_segments() -> Vec<String> {
        strings(&["info", "participants_list", "participants", "runs", "results", "detail", "details"])
    }
    pub fn dedup_keys() -> Vec<Vec<String>> {
        vec![
            strings(&["event_id", "participant_id"]),
            strings(&["event_url", "participant_id"]),
            strings(&["event_url", "bib"]),
            strings(&["event_title", "handler", "dog"]),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn validate_default_config_ok() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_slots() {
        let mut config = Config::default();
        config.extract.max_slots = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [extract]
            max_events = 3
            resume = false

            [[normalizer.fields]]
            field = "dog"
            spellings = ["can"]
            "#,
        )
        .unwrap();

        assert_eq!(config.extract.max_events, 3);
        assert!(!config.extract.resume);
        assert_eq!(config.extract.max_slots, 10);
        assert_eq!(config.normalizer.fields.len(), 1);
        assert_eq!(config.normalizer.fields[0].field, Field::Dog);
        assert!(!config.classifier.grades.is_empty());
    }

    #[test]
    fn env_overrides_apply_and_ignore_garbage() {
        let env: HashMap<&str, &str> = [
            ("OUT_DIR", "/tmp/run"),
            ("HARVEST_MAX_EVENTS", "5"),
            ("HARVEST_DELAY_MS", "not-a-number"),
            ("HARVEST_RESUME", "false"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_env_with(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.paths.output_dir, "/tmp/run");
        assert_eq!(config.extract.max_events, 5);
        assert_eq!(config.extract.request_delay_ms, 1000);
        assert!(!config.extract.resume);
    }

    #[test]
    fn dated_sink_paths_embed_run_date() {
        let paths = PathsConfig::default();
        let date = NaiveDate::from_ymd_opt(2025, 4, 12).unwrap();
        assert_eq!(
            paths.participants_sink_path(date),
            PathBuf::from("output/participants_2025-04-12.csv")
        );
        assert_eq!(paths.checkpoint_path(), PathBuf::from("output/checkpoint.json"));
    }
}
