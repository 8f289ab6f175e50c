//! PHI (Protected Health Information) Detector
//!
//! Scans free text for the HIPAA identifier categories, scores each match,
//! classifies the overall disclosure risk and optionally produces a masked
//! or encrypted variant of the text.
//!
//! Confidence starts from a per-category base that reflects how specific the
//! pattern is (an SSN-shaped string is rarely anything else, two capitalized
//! words often are), then gains a length bonus and a medical-context bonus.

use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;

use aho_corasick::{AhoCorasick, AhoCorasickBuilder};
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::catalog::PatternCatalog;
use super::error::{AnalysisError, AnalyzerKind};
use super::risk::{RiskLevel, Span};
use super::TextAnalyzer;
use crate::security::encryption::PhiCipher;

/// Added when the matched text is longer than `LENGTH_BONUS_MIN_CHARS`.
pub const LENGTH_BONUS: f32 = 0.10;
pub const LENGTH_BONUS_MIN_CHARS: usize = 10;
/// Added when the input mentions a medical-context keyword anywhere.
pub const CONTEXT_BONUS: f32 = 0.10;

/// High-risk category matches above this make the disclosure critical.
pub const HIGH_RISK_THRESHOLD: f32 = 0.8;
/// Medium-risk category matches above this count as medium evidence.
pub const MEDIUM_RISK_THRESHOLD: f32 = 0.7;
/// Anything else above this counts as lower-confidence evidence.
pub const LOW_CONFIDENCE_FLOOR: f32 = 0.5;
/// Only matches above this are masked in redact mode.
pub const REDACTION_THRESHOLD: f32 = 0.6;
/// Identifiers above this are itemized in compliance violations.
pub const HIGH_CONFIDENCE: f32 = 0.8;

/// HIPAA identifier categories that can be detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhiType {
    Name,
    Ssn,
    Phone,
    Email,
    DateOfBirth,
    MedicalRecordNumber,
    AccountNumber,
    HealthPlanNumber,
    CertificateLicense,
    Url,
    IpAddress,
    DeviceIdentifier,
    BiometricReference,
    FullFacePhoto,
    VehicleIdentifier,
    Address,
}

/// How much a single identifier contributes to disclosure risk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhiTier {
    High,
    Medium,
    Low,
}

impl PhiType {
    /// Get human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Name => "Name",
            Self::Ssn => "Social Security Number",
            Self::Phone => "Phone Number",
            Self::Email => "Email Address",
            Self::DateOfBirth => "Date of Birth",
            Self::MedicalRecordNumber => "Medical Record Number",
            Self::AccountNumber => "Account Number",
            Self::HealthPlanNumber => "Health Plan Number",
            Self::CertificateLicense => "Certificate/License Number",
            Self::Url => "URL",
            Self::IpAddress => "IP Address",
            Self::DeviceIdentifier => "Device Identifier",
            Self::BiometricReference => "Biometric Reference",
            Self::FullFacePhoto => "Full-Face Photo",
            Self::VehicleIdentifier => "Vehicle Identifier",
            Self::Address => "Street Address",
        }
    }

    /// The HIPAA Safe Harbor identifier class this category belongs to.
    pub fn hipaa_class(&self) -> &'static str {
        match self {
            Self::Name => "Names",
            Self::Ssn => "Social Security numbers",
            Self::Phone => "Telephone numbers",
            Self::Email => "Email addresses",
            Self::DateOfBirth => "Dates directly related to an individual",
            Self::MedicalRecordNumber => "Medical record numbers",
            Self::AccountNumber => "Account numbers",
            Self::HealthPlanNumber => "Health plan beneficiary numbers",
            Self::CertificateLicense => "Certificate/license numbers",
            Self::Url => "Web URLs",
            Self::IpAddress => "IP addresses",
            Self::DeviceIdentifier => "Device identifiers and serial numbers",
            Self::BiometricReference => "Biometric identifiers",
            Self::FullFacePhoto => "Full-face photographs",
            Self::VehicleIdentifier => "Vehicle identifiers and serial numbers",
            Self::Address => "Geographic subdivisions smaller than a state",
        }
    }

    /// Placeholder written over the identifier in redact mode.
    pub fn placeholder(&self) -> &'static str {
        match self {
            Self::Name => "[NAME_REDACTED]",
            Self::Ssn => "[SSN_REDACTED]",
            Self::Phone => "[PHONE_REDACTED]",
            Self::Email => "[EMAIL_REDACTED]",
            Self::DateOfBirth => "[DOB_REDACTED]",
            Self::MedicalRecordNumber => "[MRN_REDACTED]",
            Self::AccountNumber => "[ACCOUNT_REDACTED]",
            Self::HealthPlanNumber => "[HEALTH_PLAN_REDACTED]",
            Self::CertificateLicense => "[LICENSE_REDACTED]",
            Self::Url => "[URL_REDACTED]",
            Self::IpAddress => "[IP_REDACTED]",
            Self::DeviceIdentifier => "[DEVICE_ID_REDACTED]",
            Self::BiometricReference => "[BIOMETRIC_REDACTED]",
            Self::FullFacePhoto => "[PHOTO_REDACTED]",
            Self::VehicleIdentifier => "[VEHICLE_ID_REDACTED]",
            Self::Address => "[ADDRESS_REDACTED]",
        }
    }

    /// Base confidence reflecting how specific the category's patterns are.
    pub fn base_confidence(&self) -> f32 {
        match self {
            Self::Ssn => 0.95,
            Self::Email => 0.90,
            Self::MedicalRecordNumber => 0.90,
            Self::BiometricReference => 0.85,
            Self::FullFacePhoto => 0.85,
            Self::Phone => 0.80,
            Self::AccountNumber => 0.80,
            Self::HealthPlanNumber => 0.80,
            Self::DateOfBirth => 0.75,
            Self::IpAddress => 0.75,
            Self::CertificateLicense => 0.70,
            Self::Url => 0.70,
            Self::DeviceIdentifier => 0.70,
            Self::VehicleIdentifier => 0.65,
            Self::Address => 0.65,
            Self::Name => 0.40,
        }
    }

    pub fn tier(&self) -> PhiTier {
        match self {
            Self::Ssn | Self::MedicalRecordNumber | Self::BiometricReference | Self::FullFacePhoto => {
                PhiTier::High
            }
            Self::DateOfBirth
            | Self::AccountNumber
            | Self::Phone
            | Self::Email
            | Self::HealthPlanNumber => PhiTier::Medium,
            Self::Name
            | Self::CertificateLicense
            | Self::Url
            | Self::IpAddress
            | Self::DeviceIdentifier
            | Self::VehicleIdentifier
            | Self::Address => PhiTier::Low,
        }
    }
}

/// What the detector should do with PHI it finds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMode {
    #[default]
    Detect,
    Redact,
    /// Encrypt the whole text when any identifier was found, including
    /// matches too weak to raise the risk level.
    Encrypt,
}

impl AnalysisMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Detect => "detect",
            Self::Redact => "redact",
            Self::Encrypt => "encrypt",
        }
    }
}

impl FromStr for AnalysisMode {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "detect" => Ok(Self::Detect),
            "redact" => Ok(Self::Redact),
            "encrypt" => Ok(Self::Encrypt),
            other => Err(AnalysisError::InvalidMode(other.to_string())),
        }
    }
}

/// A detected identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhiIdentifier {
    pub phi_type: PhiType,
    pub value: String,
    pub span: Span,
    pub confidence: f32,
    pub hipaa_class: String,
}

/// HIPAA compliance verdict for one input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceAssessment {
    pub is_compliant: bool,
    pub violations: Vec<String>,
    pub required_actions: Vec<String>,
    pub audit_required: bool,
}

/// Full PHI detection outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhiDetectionResult {
    pub mode: AnalysisMode,
    pub identifiers: Vec<PhiIdentifier>,
    pub risk_level: RiskLevel,
    pub redacted_text: Option<String>,
    pub encrypted_text: Option<String>,
    pub compliance: ComplianceAssessment,
}

impl PhiDetectionResult {
    pub fn contains_phi(&self) -> bool {
        self.risk_level > RiskLevel::None
    }
}

/// Compiled PHI pattern tables.
pub struct PhiPatterns {
    patterns: Vec<(PhiType, Regex)>,
    medical_context: AhoCorasick,
}

const PHI_PATTERN_SOURCES: &[(PhiType, &str)] = &[
    // Titles and self-introductions, then free-form capitalized pairs
    (PhiType::Name, r"\b(?:Mr|Mrs|Ms|Miss|Dr)\.?\s+[A-Z][a-z]+(?:\s+[A-Z][a-z]+)?\b"),
    (PhiType::Name, r"(?i:\bmy name is|\bpatient|\bresident)\s+[A-Z][a-z]+(?:\s+[A-Z][a-z]+)?\b"),
    (PhiType::Name, r"\b[A-Z][a-z]+\s[A-Z][a-z]+\b"),
    (PhiType::Ssn, r"\b\d{3}-\d{2}-\d{4}\b"),
    (PhiType::Ssn, r"(?i)\b(?:ssn|social security(?: number)?)[:#\s]*\d{9}\b"),
    (PhiType::Phone, r"(?:\+?1[-.\s]?)?(?:\(\d{3}\)\s?|\b\d{3}[-.\s])\d{3}[-.\s]\d{4}\b"),
    (PhiType::Email, r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b"),
    (
        PhiType::DateOfBirth,
        r"(?i)\b(?:dob|date of birth|born on|birthday)[:\s]+\d{1,2}[/-]\d{1,2}[/-]\d{2,4}\b",
    ),
    (
        PhiType::DateOfBirth,
        r"(?i)\b(?:dob|date of birth|born on|birthday)[:\s]+(?:jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?\s+\d{1,2},?\s+\d{4}\b",
    ),
    (PhiType::DateOfBirth, r"\b\d{1,2}/\d{1,2}/\d{4}\b"),
    (
        PhiType::MedicalRecordNumber,
        r"(?i)\b(?:mrn|medical record(?: number| no\.?)?|patient id)[:#\s]*[A-Z0-9]{6,12}\b",
    ),
    (
        PhiType::AccountNumber,
        r"(?i)\b(?:account|acct)(?:\s+(?:number|no\.?|#))?[:#\s]*\d{6,17}\b",
    ),
    (
        PhiType::HealthPlanNumber,
        r"(?i)\b(?:member id|policy (?:number|no\.?)|insurance id|medicare(?: number)?|medicaid(?: number)?)[:#\s]*[A-Z0-9]{6,15}\b",
    ),
    (
        PhiType::CertificateLicense,
        r"(?i)\b(?:license|licence|certificate|dea)(?:\s+(?:number|no\.?|#))?[:#\s]*[A-Z]{0,2}\d{5,12}\b",
    ),
    (PhiType::Url, r#"\bhttps?://[^\s<>"]+"#),
    (
        PhiType::IpAddress,
        r"\b(?:(?:25[0-5]|2[0-4]\d|1\d\d|[1-9]?\d)\.){3}(?:25[0-5]|2[0-4]\d|1\d\d|[1-9]?\d)\b",
    ),
    (
        PhiType::DeviceIdentifier,
        r"(?i)\b(?:serial(?: number| no\.?)?|device id|imei|udi)[:#\s]*[A-Z0-9][A-Z0-9-]{5,19}\b",
    ),
    (PhiType::DeviceIdentifier, r"\b(?:[0-9A-Fa-f]{2}[:-]){5}[0-9A-Fa-f]{2}\b"),
    (
        PhiType::BiometricReference,
        r"(?i)\b(?:fingerprint|retina scan|iris scan|voiceprint|face scan|biometric)\s+(?:id|record|data|template|scan|file)s?\b",
    ),
    (
        PhiType::FullFacePhoto,
        r"(?i)\b(?:full[- ]face|facial|headshot|passport)\s+(?:photo|photograph|image|picture)s?\b",
    ),
    (PhiType::VehicleIdentifier, r"\b[A-HJ-NPR-Z0-9]{17}\b"),
    (
        PhiType::VehicleIdentifier,
        r"(?i)\b(?:license plate|plate number|vin)[:#\s]*[A-Z0-9-]{2,17}\b",
    ),
    (
        PhiType::Address,
        r"\b\d{1,5}\s+(?:[A-Z][a-z]+\s){1,3}(?:Street|St|Avenue|Ave|Road|Rd|Boulevard|Blvd|Drive|Dr|Lane|Ln|Way|Court|Ct)\b",
    ),
];

const MEDICAL_CONTEXT_KEYWORDS: &[&str] = &[
    "patient",
    "diagnosis",
    "diagnosed",
    "medication",
    "prescription",
    "doctor",
    "physician",
    "hospital",
    "clinic",
    "treatment",
    "medical",
    "health",
    "insurance",
    "nurse",
    "therapy",
    "surgery",
    "dementia",
    "blood pressure",
    "mrn",
    "chart",
];

impl PhiPatterns {
    pub fn compile() -> Result<Self, AnalysisError> {
        let patterns = PHI_PATTERN_SOURCES
            .iter()
            .map(|(phi_type, source)| {
                Regex::new(source)
                    .map(|re| (*phi_type, re))
                    .map_err(|e| AnalysisError::PatternCompile {
                        family: "phi",
                        reason: e.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let medical_context = AhoCorasickBuilder::new()
            .ascii_case_insensitive(true)
            .build(MEDICAL_CONTEXT_KEYWORDS)
            .map_err(|e| AnalysisError::PatternCompile {
                family: "phi_context",
                reason: e.to_string(),
            })?;

        Ok(Self {
            patterns,
            medical_context,
        })
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// PHI detector over a shared pattern catalog.
pub struct PhiDetector {
    catalog: Arc<PatternCatalog>,
    cipher: Option<Arc<PhiCipher>>,
}

impl PhiDetector {
    /// Detector without an encryption key. Encrypt mode will fail closed.
    pub fn new(catalog: Arc<PatternCatalog>) -> Self {
        Self {
            catalog,
            cipher: None,
        }
    }

    pub fn with_cipher(catalog: Arc<PatternCatalog>, cipher: Arc<PhiCipher>) -> Self {
        Self {
            catalog,
            cipher: Some(cipher),
        }
    }

    /// Run detection in the given mode.
    pub fn detect(&self, text: &str, mode: AnalysisMode) -> Result<PhiDetectionResult, AnalysisError> {
        let identifiers = self.scan(text);
        let risk_level = classify_risk(&identifiers);

        let redacted_text = match mode {
            AnalysisMode::Redact => Some(redact(text, &identifiers)),
            _ => None,
        };

        let encrypted_text = match mode {
            AnalysisMode::Encrypt => {
                let cipher = self
                    .cipher
                    .as_ref()
                    .ok_or(AnalysisError::EncryptionKeyUnavailable)?;
                if !identifiers.is_empty() {
                    Some(cipher.encrypt(text.as_bytes())?)
                } else {
                    None
                }
            }
            _ => None,
        };

        let compliance = assess_compliance(risk_level, &identifiers);

        Ok(PhiDetectionResult {
            mode,
            identifiers,
            risk_level,
            redacted_text,
            encrypted_text,
            compliance,
        })
    }

    /// Every pattern match as a scored identifier, ordered by position.
    pub fn scan(&self, text: &str) -> Vec<PhiIdentifier> {
        let phi = &self.catalog.phi;
        let medical_context = phi.medical_context.is_match(text);
        let mut identifiers: Vec<PhiIdentifier> = Vec::new();
        let mut seen: HashSet<(PhiType, usize, usize)> = HashSet::new();

        for (phi_type, regex) in phi.patterns.iter() {
            for m in regex.find_iter(text) {
                let span = Span::from(m);
                if !seen.insert((*phi_type, span.start, span.end)) {
                    continue;
                }

                identifiers.push(PhiIdentifier {
                    phi_type: *phi_type,
                    value: m.as_str().to_string(),
                    span,
                    confidence: score(*phi_type, m.as_str(), medical_context),
                    hipaa_class: phi_type.hipaa_class().to_string(),
                });
            }
        }

        identifiers.sort_by_key(|id| (id.span.start, id.span.end));
        identifiers
    }

    /// Check if text contains any PHI above the evidence floor
    pub fn contains_phi(&self, text: &str) -> bool {
        self.scan(text)
            .iter()
            .any(|id| id.confidence > LOW_CONFIDENCE_FLOOR)
    }

    pub fn has_cipher(&self) -> bool {
        self.cipher.is_some()
    }
}

impl TextAnalyzer for PhiDetector {
    type Output = PhiDetectionResult;

    fn kind(&self) -> AnalyzerKind {
        AnalyzerKind::Phi
    }

    fn analyze(&self, text: &str) -> Result<PhiDetectionResult, AnalysisError> {
        self.detect(text, AnalysisMode::Detect)
    }
}

fn score(phi_type: PhiType, matched: &str, medical_context: bool) -> f32 {
    let mut confidence = phi_type.base_confidence();
    if matched.chars().count() > LENGTH_BONUS_MIN_CHARS {
        confidence += LENGTH_BONUS;
    }
    if medical_context {
        confidence += CONTEXT_BONUS;
    }
    confidence.min(1.0)
}

/// First matching rule wins.
fn classify_risk(identifiers: &[PhiIdentifier]) -> RiskLevel {
    let mut high = 0usize;
    let mut medium = 0usize;
    let mut low = 0usize;

    for id in identifiers {
        match id.phi_type.tier() {
            PhiTier::High if id.confidence > HIGH_RISK_THRESHOLD => high += 1,
            PhiTier::Medium if id.confidence > MEDIUM_RISK_THRESHOLD => medium += 1,
            _ if id.confidence > LOW_CONFIDENCE_FLOOR => low += 1,
            _ => {}
        }
    }

    if high >= 1 {
        RiskLevel::Critical
    } else if medium >= 2 || (medium == 1 && low >= 2) {
        RiskLevel::High
    } else if medium == 1 || low >= 2 {
        RiskLevel::Medium
    } else if low == 1 {
        RiskLevel::Low
    } else {
        RiskLevel::None
    }
}

/// Mask identifiers above the redaction threshold.
///
/// Overlapping spans are merged first so every replacement range is disjoint,
/// then replacements run from the highest start offset down so earlier
/// offsets stay valid.
fn redact(text: &str, identifiers: &[PhiIdentifier]) -> String {
    let mut candidates: Vec<(Span, PhiType, f32)> = identifiers
        .iter()
        .filter(|id| id.confidence > REDACTION_THRESHOLD)
        .map(|id| (id.span, id.phi_type, id.confidence))
        .collect();
    candidates.sort_by_key(|(span, _, _)| (span.start, std::cmp::Reverse(span.end)));

    let mut merged: Vec<(Span, PhiType, f32)> = Vec::with_capacity(candidates.len());
    for (span, phi_type, confidence) in candidates {
        if let Some(last) = merged.last_mut() {
            if span.start < last.0.end {
                last.0.end = last.0.end.max(span.end);
                if confidence > last.2 {
                    last.1 = phi_type;
                    last.2 = confidence;
                }
                continue;
            }
        }
        merged.push((span, phi_type, confidence));
    }

    let mut result = text.to_string();
    for (span, phi_type, _) in merged.iter().rev() {
        result.replace_range(span.start..span.end, phi_type.placeholder());
    }
    result
}

fn assess_compliance(risk_level: RiskLevel, identifiers: &[PhiIdentifier]) -> ComplianceAssessment {
    let is_compliant = !risk_level.is_elevated();

    let violations = if is_compliant {
        Vec::new()
    } else {
        identifiers
            .iter()
            .filter(|id| id.confidence > HIGH_CONFIDENCE)
            .map(|id| {
                format!(
                    "{} detected at {}..{} (HIPAA identifier: {})",
                    id.phi_type.name(),
                    id.span.start,
                    id.span.end,
                    id.hipaa_class
                )
            })
            .collect()
    };

    let required_actions: Vec<String> = match risk_level {
        RiskLevel::Critical => vec![
            "Immediate redaction or encryption of PHI required".into(),
            "Escalate to the compliance officer".into(),
            "Record a HIPAA audit entry for this disclosure".into(),
        ],
        RiskLevel::High => vec![
            "Redaction recommended before storage or display".into(),
            "Review PHI handling procedures".into(),
        ],
        _ => Vec::new(),
    };

    ComplianceAssessment {
        is_compliant,
        violations,
        required_actions,
        audit_required: risk_level >= RiskLevel::Medium,
    }
}
