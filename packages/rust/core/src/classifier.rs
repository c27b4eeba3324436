//! Content classification: tool identity, finding type, severity.
//!
//! Everything here is pure. The only state is the [`ToolRegistry`], an
//! ordered list of tool entries built once from the built-in table plus any
//! `[[tools]]` overrides from the config file.

use std::net::IpAddr;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

use casegraph_shared::{
    CaseGraphError, ContactData, ContactKind, ContactRisk, EntityKind, FindingData, FindingType,
    RawFinding, Result, Severity, ToolConfigEntry,
};

// ---------------------------------------------------------------------------
// Tool registry
// ---------------------------------------------------------------------------

/// Built-in tools in declared (tie-break) order: key, display name, category.
const BUILTIN_TOOLS: &[(&str, &str, &str)] = &[
    ("sanctions", "Sanctions Check", "compliance"),
    ("pep_check", "PEP Screening", "compliance"),
    ("adverse_media", "Adverse Media", "compliance"),
    ("geo_risk", "Geographic Risk", "compliance"),
    ("business_registry", "Business Registry", "compliance"),
    ("ubo_lookup", "UBO Lookup", "compliance"),
    ("employment_verify", "Employment Verification", "hr"),
    ("education_verify", "Education Verification", "hr"),
    ("court_records", "Court Records", "legal"),
    ("property_records", "Property Records", "legal"),
    ("corporate_filings", "Corporate Filings", "legal"),
    ("phone_lookup", "Phone Lookup", "digital"),
    ("email_lookup", "Email Lookup", "digital"),
    ("social_media", "Social Media", "digital"),
    ("domain_whois", "Domain WHOIS", "digital"),
    ("ip_geolocation", "IP Geolocation", "digital"),
    ("crypto_trace", "Crypto Trace", "digital"),
];

/// Default command patterns for a tool key: its script file, its module path,
/// or its directory path.
pub fn default_patterns(key: &str) -> Vec<String> {
    let k = regex::escape(key);
    vec![format!(r"(?:{k}\.py|src\.tools\.{k}|tools/{k})")]
}

/// One registered screening tool.
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub key: String,
    pub name: String,
    pub category: String,
    patterns: Vec<Regex>,
}

impl ToolSpec {
    fn new(key: &str, name: &str, category: &str, patterns: &[String]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|e| {
                    CaseGraphError::config(format!("invalid pattern for tool '{key}': {e}"))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            key: key.to_string(),
            name: name.to_string(),
            category: category.to_string(),
            patterns,
        })
    }

    /// Whether any of this tool's patterns matches the command text.
    pub fn matches(&self, command: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(command))
    }

    /// Source text of the compiled patterns.
    pub fn pattern_sources(&self) -> Vec<&str> {
        self.patterns.iter().map(Regex::as_str).collect()
    }
}

/// Ordered registry of screening tools. First match wins.
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    tools: Vec<ToolSpec>,
}

impl ToolRegistry {
    /// The built-in registry.
    pub fn builtin() -> Self {
        let tools = BUILTIN_TOOLS
            .iter()
            .filter_map(|(key, name, category)| {
                ToolSpec::new(key, name, category, &default_patterns(key)).ok()
            })
            .collect();
        Self { tools }
    }

    /// Built-in registry with config entries applied. An entry whose key
    /// matches a built-in tool replaces it in place; new keys are appended.
    pub fn from_config(entries: &[ToolConfigEntry]) -> Result<Self> {
        let mut registry = Self::builtin();
        for entry in entries {
            let key = entry.key.trim();
            let existing = registry.tools.iter().position(|t| t.key == key);

            let name = entry
                .name
                .clone()
                .or_else(|| existing.map(|i| registry.tools[i].name.clone()))
                .unwrap_or_else(|| humanize_key(key));
            let category = entry
                .category
                .clone()
                .or_else(|| existing.map(|i| registry.tools[i].category.clone()))
                .unwrap_or_else(|| "custom".to_string());
            let patterns = if entry.patterns.is_empty() {
                default_patterns(key)
            } else {
                entry.patterns.clone()
            };

            let spec = ToolSpec::new(key, &name, &category, &patterns)?;
            match existing {
                Some(i) => registry.tools[i] = spec,
                None => registry.tools.push(spec),
            }
        }
        tracing::debug!(tools = registry.tools.len(), "tool registry built");
        Ok(registry)
    }

    pub fn tools(&self) -> &[ToolSpec] {
        &self.tools
    }

    pub fn get(&self, key: &str) -> Option<&ToolSpec> {
        self.tools.iter().find(|t| t.key == key)
    }

    /// Match a shell command against the registry in declared order.
    pub fn detect(&self, command: &str) -> Option<&ToolSpec> {
        self.tools.iter().find(|t| t.matches(command))
    }

    /// Resolve the tool behind an agent.
    ///
    /// An explicit identity always wins and skips pattern matching. Legacy
    /// events without one fall back to the registry key the upstream agent id
    /// was minted from (`{key}-{suffix}`), then to pattern matching over the
    /// task text.
    pub fn identify(
        &self,
        explicit: Option<&str>,
        agent_id: &str,
        task: Option<&str>,
    ) -> Option<String> {
        if let Some(key) = explicit.map(str::trim).filter(|k| !k.is_empty()) {
            return Some(key.to_string());
        }

        let by_id = self
            .tools
            .iter()
            .filter(|t| {
                agent_id == t.key
                    || agent_id
                        .strip_prefix(t.key.as_str())
                        .is_some_and(|rest| rest.starts_with('-'))
            })
            .max_by_key(|t| t.key.len());
        if let Some(tool) = by_id {
            return Some(tool.key.clone());
        }

        task.and_then(|t| self.detect(t)).map(|t| t.key.clone())
    }

    /// Display name for a key, falling back to a humanized key.
    pub fn display_name(&self, key: &str) -> String {
        self.get(key)
            .map(|t| t.name.clone())
            .unwrap_or_else(|| humanize_key(key))
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

/// `pep_check` -> `Pep Check`.
fn humanize_key(key: &str) -> String {
    key.split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

// ---------------------------------------------------------------------------
// Presets
// ---------------------------------------------------------------------------

/// Named tool selections offered when starting an investigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    All,
    Compliance,
    HrBackground,
    Journalism,
    Digital,
}

impl Preset {
    pub const ALL: [Preset; 5] = [
        Self::All,
        Self::Compliance,
        Self::HrBackground,
        Self::Journalism,
        Self::Digital,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Compliance => "compliance",
            Self::HrBackground => "hr_background",
            Self::Journalism => "journalism",
            Self::Digital => "digital",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::All => "Complete Investigation",
            Self::Compliance => "Compliance & AML",
            Self::HrBackground => "HR Background Check",
            Self::Journalism => "Investigative Research",
            Self::Digital => "Digital Footprint",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::All => "Run all available checks",
            Self::Compliance => "KYC, sanctions, PEP screening",
            Self::HrBackground => "Employment, education, records",
            Self::Journalism => "Court, property, corporate records",
            Self::Digital => "Email, phone, domain, IP analysis",
        }
    }

    /// Tool keys run by this preset.
    pub fn tools(&self) -> &'static [&'static str] {
        match self {
            Self::All => &[
                "sanctions",
                "pep_check",
                "adverse_media",
                "geo_risk",
                "business_registry",
                "ubo_lookup",
                "court_records",
                "property_records",
                "corporate_filings",
                "phone_lookup",
                "email_lookup",
                "social_media",
                "domain_whois",
                "ip_geolocation",
                "crypto_trace",
            ],
            Self::Compliance => &[
                "sanctions",
                "pep_check",
                "adverse_media",
                "geo_risk",
                "business_registry",
                "ubo_lookup",
            ],
            Self::HrBackground => &[
                "employment_verify",
                "education_verify",
                "court_records",
                "social_media",
                "adverse_media",
            ],
            Self::Journalism => &[
                "court_records",
                "property_records",
                "corporate_filings",
                "adverse_media",
                "social_media",
                "ubo_lookup",
            ],
            Self::Digital => &[
                "email_lookup",
                "phone_lookup",
                "domain_whois",
                "ip_geolocation",
                "social_media",
                "crypto_trace",
            ],
        }
    }
}

impl FromStr for Preset {
    type Err = CaseGraphError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| CaseGraphError::config(format!("unknown tool preset '{s}'")))
    }
}

// ---------------------------------------------------------------------------
// Finding classification
// ---------------------------------------------------------------------------

static BTC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(bc1|[13])[a-zA-HJ-NP-Z0-9]{25,39}$").expect("btc address regex")
});

static ETH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^0x[a-fA-F0-9]{40}$").expect("eth address regex"));

static MENTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([A-Z][a-z]+ [A-Z][a-z]+)\b").expect("mention bigram regex")
});

/// Status words reported by tools that mark a completion as a warning.
pub const WARNING_STATUSES: &[&str] = &["match", "alert", "high", "critical"];

pub fn is_warning_status(status: &str) -> bool {
    WARNING_STATUSES.contains(&status.trim().to_ascii_lowercase().as_str())
}

fn str_field<'a>(finding: &'a RawFinding, key: &str) -> Option<&'a str> {
    finding
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn num_field(finding: &RawFinding, key: &str) -> Option<f64> {
    match finding.get(key)? {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn has_field(finding: &RawFinding, key: &str) -> bool {
    finding.get(key).is_some_and(|v| !v.is_null())
}

fn string_values(finding: &RawFinding) -> impl Iterator<Item = &str> {
    finding.values().filter_map(|v| v.as_str()).map(str::trim)
}

fn is_crypto_address(s: &str) -> bool {
    BTC_RE.is_match(s) || ETH_RE.is_match(s)
}

/// Fixed tool -> default finding type table.
fn tool_default_type(tool: &str) -> Option<FindingType> {
    match tool {
        "sanctions" => Some(FindingType::Sanction),
        "pep_check" => Some(FindingType::Pep),
        "adverse_media" => Some(FindingType::AdverseMedia),
        "ip_geolocation" => Some(FindingType::IpAddress),
        "crypto_trace" => Some(FindingType::Crypto),
        "business_registry" | "corporate_filings" => Some(FindingType::Company),
        "ubo_lookup" => Some(FindingType::Person),
        _ => None,
    }
}

/// Classify a finding by its shape, falling back to the tool's default type.
pub fn infer_finding_type(finding: &RawFinding, tool: Option<&str>) -> FindingType {
    if string_values(finding).any(|s| s.parse::<IpAddr>().is_ok()) {
        return FindingType::IpAddress;
    }
    if string_values(finding).any(is_crypto_address)
        || finding.keys().any(|k| k.to_ascii_lowercase().contains("wallet"))
    {
        return FindingType::Crypto;
    }
    if has_field(finding, "company") || has_field(finding, "organization") {
        return FindingType::Company;
    }
    if has_field(finding, "person") || has_field(finding, "individual") {
        return FindingType::Person;
    }
    tool.and_then(tool_default_type)
        .unwrap_or(FindingType::Generic)
}

/// Map a status word to a severity. Unrecognized words yield `None`.
fn severity_from_word(word: &str) -> Option<Severity> {
    match word.to_ascii_lowercase().as_str() {
        "critical" => Some(Severity::Critical),
        "high" | "match" | "alert" => Some(Severity::High),
        "medium" => Some(Severity::Medium),
        "low" => Some(Severity::Low),
        _ => None,
    }
}

/// Severity for a numeric score. Fractions in `0.0..=1.0` are scaled to percent.
pub fn severity_from_score(score: f64) -> Severity {
    let score = if (0.0..=1.0).contains(&score) {
        score * 100.0
    } else {
        score
    };
    if score >= 90.0 {
        Severity::Critical
    } else if score >= 70.0 {
        Severity::High
    } else if score >= 40.0 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// Infer a finding's severity. A recognized status word overrides any score.
pub fn infer_severity(finding: &RawFinding) -> Severity {
    let word = ["severity", "status", "risk_level"]
        .iter()
        .filter_map(|k| str_field(finding, k))
        .find_map(severity_from_word);
    if let Some(severity) = word {
        return severity;
    }

    num_field(finding, "score")
        .or_else(|| num_field(finding, "confidence"))
        .map(severity_from_score)
        .unwrap_or(Severity::Low)
}

/// Root risk score for an investigation's overall risk level.
pub fn risk_level_to_score(risk_level: &str) -> u32 {
    match risk_level {
        "high" => 85,
        "medium" => 50,
        _ => 20,
    }
}

/// Guess whether a display name refers to a company.
pub fn guess_entity_kind(name: &str) -> EntityKind {
    const SUFFIXES: &[&str] = &["llc", "inc", "corp", "ltd", "gmbh", "sa"];
    let is_company = name
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|w| !w.is_empty())
        .map(|w| w.trim_end_matches('.').to_ascii_lowercase())
        .any(|w| SUFFIXES.contains(&w.as_str()));
    if is_company {
        EntityKind::Company
    } else {
        EntityKind::Individual
    }
}

/// Display label for a finding.
pub fn finding_label(finding: &RawFinding, finding_type: FindingType) -> String {
    ["name", "title", "handle", "platform", "country"]
        .iter()
        .find_map(|k| str_field(finding, k))
        .map(String::from)
        .unwrap_or_else(|| finding_type.display_name().to_string())
}

/// Build the generic finding payload.
pub fn build_finding(finding: &RawFinding, tool: Option<&str>) -> FindingData {
    let finding_type = infer_finding_type(finding, tool);
    let description = ["description", "summary", "position", "pep_level", "fatf_status"]
        .iter()
        .find_map(|k| str_field(finding, k))
        .map(String::from);
    let source = str_field(finding, "source")
        .map(String::from)
        .or_else(|| match finding.get("datasets") {
            Some(serde_json::Value::Array(items)) => {
                let names: Vec<&str> = items.iter().filter_map(|v| v.as_str()).collect();
                (!names.is_empty()).then(|| names.join(", "))
            }
            _ => None,
        });

    FindingData {
        finding_type,
        severity: infer_severity(finding),
        source,
        confidence: num_field(finding, "confidence").or_else(|| num_field(finding, "score")),
        description,
        url: str_field(finding, "url").map(String::from),
        raw: finding.clone(),
    }
}

/// Tools whose findings are drawn as compact contact nodes.
pub fn contact_kind_for_tool(tool: &str) -> Option<ContactKind> {
    match tool {
        "phone_lookup" => Some(ContactKind::Phone),
        "email_lookup" => Some(ContactKind::Email),
        "social_media" => Some(ContactKind::Social),
        _ => None,
    }
}

fn contact_risk(finding: &RawFinding, kind: ContactKind) -> ContactRisk {
    if let Some(flag) = str_field(finding, "risk_flag") {
        return if flag.to_ascii_lowercase().contains("high") {
            ContactRisk::High
        } else {
            ContactRisk::Medium
        };
    }
    if kind == ContactKind::Email {
        let breaches = num_field(finding, "breach_count").unwrap_or(0.0);
        if breaches >= 3.0 {
            return ContactRisk::High;
        }
        if breaches >= 1.0 || finding.get("disposable").and_then(|v| v.as_bool()) == Some(true) {
            return ContactRisk::Medium;
        }
    }
    ContactRisk::Low
}

/// Build the compact contact payload.
pub fn build_contact(finding: &RawFinding, kind: ContactKind) -> ContactData {
    let value_keys: &[&str] = match kind {
        ContactKind::Phone => &["phone", "number", "registered_name", "carrier"],
        ContactKind::Email => &["email", "address", "domain"],
        ContactKind::Social => &["handle", "url", "platform"],
    };
    let value = value_keys
        .iter()
        .find_map(|k| str_field(finding, k))
        .map(String::from)
        .unwrap_or_else(|| {
            match kind {
                ContactKind::Phone => "Phone",
                ContactKind::Email => "Email",
                ContactKind::Social => "Profile",
            }
            .to_string()
        });

    ContactData {
        contact_kind: kind,
        value,
        risk: contact_risk(finding, kind),
        platform: str_field(finding, "platform").map(String::from),
        carrier: str_field(finding, "carrier").map(String::from),
        breaches: num_field(finding, "breach_count").map(|n| n.max(0.0) as u32),
        country: str_field(finding, "country").map(String::from),
        raw: finding.clone(),
    }
}

/// Candidate entity names (capitalized bigrams) mentioned in a title, in
/// order of first appearance, without duplicates or the subject's own name.
pub fn extract_mentions(title: &str, subject: &str, max: usize) -> Vec<String> {
    let subject = subject.to_lowercase();
    let mut out: Vec<String> = Vec::new();
    for cap in MENTION_RE.captures_iter(title) {
        let name = &cap[1];
        let lower = name.to_lowercase();
        if subject.contains(&lower) || out.iter().any(|n| n.to_lowercase() == lower) {
            continue;
        }
        out.push(name.to_string());
        if out.len() >= max {
            break;
        }
    }
    out
}

/// Agent label from a task string: `Running Sanctions Check...` -> `Sanctions Check`.
pub fn extract_tool_label(task: Option<&str>) -> String {
    task.map(|t| t.replacen("Running ", "", 1).replacen("...", "", 1))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "Agent".to_string())
}

/// Lowercase, dash-separated slug used in derived node ids.
pub fn slugify(s: &str) -> String {
    let mut slug = String::with_capacity(s.len());
    for c in s.chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    slug.trim_end_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn finding(value: serde_json::Value) -> RawFinding {
        match value {
            serde_json::Value::Object(map) => map,
            _ => panic!("finding must be an object"),
        }
    }

    #[test]
    fn builtin_registry_order() {
        let registry = ToolRegistry::builtin();
        assert_eq!(registry.tools().len(), 17);
        assert_eq!(registry.tools()[0].key, "sanctions");
        assert_eq!(registry.tools()[16].key, "crypto_trace");
        assert_eq!(registry.display_name("pep_check"), "PEP Screening");
        assert_eq!(registry.display_name("vessel_tracking"), "Vessel Tracking");
    }

    #[test]
    fn detect_tool_from_command() {
        let registry = ToolRegistry::builtin();
        let hit = registry.detect("python -m src.tools.sanctions 'Acme Holdings Ltd'");
        assert_eq!(hit.map(|t| t.key.as_str()), Some("sanctions"));

        let hit = registry.detect("cd backend && python tools/pep_check.py --name 'Jane Doe'");
        assert_eq!(hit.map(|t| t.key.as_str()), Some("pep_check"));

        assert!(registry.detect("ls -la /tmp").is_none());
    }

    #[test]
    fn detect_first_match_wins() {
        let registry = ToolRegistry::builtin();
        // Both tools appear; sanctions is declared first.
        let cmd = "python src/tools/pep_check.py && python src/tools/sanctions.py";
        assert_eq!(registry.detect(cmd).map(|t| t.key.as_str()), Some("sanctions"));
    }

    #[test]
    fn identify_prefers_explicit_field() {
        let registry = ToolRegistry::builtin();
        assert_eq!(
            registry.identify(Some("crypto_trace"), "sanctions-a1b2", None),
            Some("crypto_trace".into())
        );
        assert_eq!(
            registry.identify(None, "pep_check-cm4x9", None),
            Some("pep_check".into())
        );
        assert_eq!(
            registry.identify(None, "agent-7", Some("python src.tools.geo_risk RU")),
            Some("geo_risk".into())
        );
        assert_eq!(registry.identify(None, "agent-7", Some("Running...")), None);
    }

    #[test]
    fn config_entries_replace_and_extend() {
        let entries = vec![
            ToolConfigEntry {
                key: "sanctions".into(),
                name: None,
                category: None,
                patterns: vec![r"ofac_screen".into()],
            },
            ToolConfigEntry {
                key: "vessel_tracking".into(),
                name: Some("Vessel Tracking".into()),
                category: Some("logistics".into()),
                patterns: vec![],
            },
        ];
        let registry = ToolRegistry::from_config(&entries).expect("valid registry");
        assert_eq!(registry.tools().len(), 18);
        assert_eq!(registry.tools()[0].key, "sanctions");
        assert_eq!(registry.tools()[0].name, "Sanctions Check");
        assert!(registry.tools()[0].matches("ofac_screen --all"));
        assert!(!registry.tools()[0].matches("python sanctions.py"));
        assert_eq!(
            registry.detect("python vessel_tracking.py").map(|t| t.key.as_str()),
            Some("vessel_tracking")
        );
    }

    #[test]
    fn config_rejects_bad_pattern() {
        let entries = vec![ToolConfigEntry {
            key: "broken".into(),
            name: None,
            category: None,
            patterns: vec!["(unclosed".into()],
        }];
        let err = ToolRegistry::from_config(&entries).unwrap_err();
        assert!(err.to_string().contains("broken"));
    }

    #[test]
    fn presets() {
        assert_eq!("hr_background".parse::<Preset>().unwrap(), Preset::HrBackground);
        assert!("everything".parse::<Preset>().is_err());
        assert_eq!(Preset::Compliance.tools().len(), 6);
        let registry = ToolRegistry::builtin();
        for preset in Preset::ALL {
            for key in preset.tools() {
                assert!(registry.get(key).is_some(), "{key} missing from registry");
            }
        }
    }

    #[test]
    fn finding_type_structural_rules() {
        let f = finding(json!({"ip": "185.220.101.4", "country": "DE"}));
        assert_eq!(infer_finding_type(&f, Some("sanctions")), FindingType::IpAddress);

        let f = finding(json!({"address": "0x52908400098527886E0F7030069857D2E4169EE7"}));
        assert_eq!(infer_finding_type(&f, None), FindingType::Crypto);

        let f = finding(json!({"wallet_label": "cold storage"}));
        assert_eq!(infer_finding_type(&f, None), FindingType::Crypto);

        let f = finding(json!({"company": "Acme Holdings Ltd", "role": "director"}));
        assert_eq!(infer_finding_type(&f, Some("ubo_lookup")), FindingType::Company);

        let f = finding(json!({"person": "Jane Doe"}));
        assert_eq!(infer_finding_type(&f, None), FindingType::Person);
    }

    #[test]
    fn finding_type_tool_fallback() {
        let f = finding(json!({"name": "Jane Doe", "schema": "Person", "score": 100}));
        assert_eq!(infer_finding_type(&f, Some("sanctions")), FindingType::Sanction);
        assert_eq!(infer_finding_type(&f, Some("pep_check")), FindingType::Pep);
        assert_eq!(infer_finding_type(&f, Some("court_records")), FindingType::Generic);
        assert_eq!(infer_finding_type(&f, None), FindingType::Generic);
    }

    #[test]
    fn severity_thresholds() {
        assert_eq!(severity_from_score(95.0), Severity::Critical);
        assert_eq!(severity_from_score(75.0), Severity::High);
        assert_eq!(severity_from_score(45.0), Severity::Medium);
        assert_eq!(severity_from_score(10.0), Severity::Low);
        assert_eq!(severity_from_score(0.92), Severity::Critical);
    }

    #[test]
    fn status_word_overrides_score() {
        let f = finding(json!({"status": "critical", "score": 10}));
        assert_eq!(infer_severity(&f), Severity::Critical);

        let f = finding(json!({"status": "match", "score": 10}));
        assert_eq!(infer_severity(&f), Severity::High);

        let f = finding(json!({"status": "unknown", "confidence": 45}));
        assert_eq!(infer_severity(&f), Severity::Medium);

        let f = finding(json!({"title": "no signals"}));
        assert_eq!(infer_severity(&f), Severity::Low);
    }

    #[test]
    fn risk_mapping() {
        assert_eq!(risk_level_to_score("high"), 85);
        assert_eq!(risk_level_to_score("medium"), 50);
        assert_eq!(risk_level_to_score("low"), 20);
        assert_eq!(risk_level_to_score("HIGH"), 20);
    }

    #[test]
    fn warning_statuses() {
        assert!(is_warning_status("match"));
        assert!(is_warning_status("Alert"));
        assert!(!is_warning_status("clear"));
    }

    #[test]
    fn entity_kind_guess() {
        assert_eq!(guess_entity_kind("Acme Holdings Ltd."), EntityKind::Company);
        assert_eq!(guess_entity_kind("Globex, Inc"), EntityKind::Company);
        assert_eq!(guess_entity_kind("Jane Doe"), EntityKind::Individual);
        assert_eq!(guess_entity_kind("Samantha Ray"), EntityKind::Individual);
    }

    #[test]
    fn labels() {
        let f = finding(json!({"title": "Regulator fines Acme", "name": ""}));
        assert_eq!(finding_label(&f, FindingType::AdverseMedia), "Regulator fines Acme");
        let f = finding(json!({"score": 80}));
        assert_eq!(finding_label(&f, FindingType::Sanction), "Sanctions Hit");

        assert_eq!(extract_tool_label(Some("Running Sanctions Check...")), "Sanctions Check");
        assert_eq!(extract_tool_label(Some("Running ...")), "Agent");
        assert_eq!(extract_tool_label(None), "Agent");
    }

    #[test]
    fn build_finding_fields() {
        let f = finding(json!({
            "name": "Jane Doe",
            "datasets": ["us_ofac_sdn", "eu_fsf"],
            "score": 0.97,
            "url": "https://example.org/entity/1",
        }));
        let data = build_finding(&f, Some("sanctions"));
        assert_eq!(data.finding_type, FindingType::Sanction);
        assert_eq!(data.severity, Severity::Critical);
        assert_eq!(data.source.as_deref(), Some("us_ofac_sdn, eu_fsf"));
        assert_eq!(data.url.as_deref(), Some("https://example.org/entity/1"));
        assert_eq!(data.raw, f);
    }

    #[test]
    fn contacts() {
        let f = finding(json!({"carrier": "MTS", "country": "RU", "risk_flag": "high_risk_jurisdiction"}));
        let c = build_contact(&f, ContactKind::Phone);
        assert_eq!(c.value, "MTS");
        assert_eq!(c.risk, ContactRisk::High);
        assert_eq!(c.country.as_deref(), Some("RU"));

        let f = finding(json!({"breach_count": 2, "breaches": ["LinkedIn 2021", "Adobe 2013"]}));
        let c = build_contact(&f, ContactKind::Email);
        assert_eq!(c.breaches, Some(2));
        assert_eq!(c.risk, ContactRisk::Medium);

        let f = finding(json!({"platform": "Reddit", "handle": "u/throwaway12345", "risk_flag": "anonymous_account"}));
        let c = build_contact(&f, ContactKind::Social);
        assert_eq!(c.value, "u/throwaway12345");
        assert_eq!(c.platform.as_deref(), Some("Reddit"));
        assert_eq!(c.risk, ContactRisk::Medium);

        assert_eq!(contact_kind_for_tool("social_media"), Some(ContactKind::Social));
        assert_eq!(contact_kind_for_tool("sanctions"), None);
    }

    #[test]
    fn mentions_skip_subject_and_duplicates() {
        let title = "Acme Holdings faces inquiry as John Smith and Maria Lopez testify; John Smith resigns";
        let names = extract_mentions(title, "Acme Holdings Ltd", 3);
        assert_eq!(names, vec!["John Smith", "Maria Lopez"]);

        let names = extract_mentions("Jane Doe Meets Peter Pan With Tom Hardy", "Nobody", 2);
        assert_eq!(names.len(), 2);
    }

    #[test]
    fn slugs() {
        assert_eq!(slugify("John Smith"), "john-smith");
        assert_eq!(slugify("  O'Brien & Co. "), "o-brien-co");
    }
}
