//! Behavioural conformance checks for driver implementations.
//!
//! [`check`] exercises a driver with a throwaway entity and reports which
//! parts of the contract it honours. It is meant for third-party drivers
//! registered through [`DriverRegistry::extend`](crate::DriverRegistry::extend).

use lingo_types::{AttributeMap, EntityRef, Language};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::contract::TranslationDriver;

/// Entity type of the scratch data. It sorts into its own key namespace.
const SCRATCH_TYPE: &str = "LingoConformanceCheck";

/// Outcome of one conformance check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckResult {
    pub name: &'static str,
    /// `None` on success, otherwise what went wrong.
    pub failure: Option<String>,
}

impl CheckResult {
    pub fn passed(&self) -> bool {
        self.failure.is_none()
    }
}

/// Result of running [`check`] against one driver.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConformanceReport {
    pub driver: String,
    pub checks: Vec<CheckResult>,
}

impl ConformanceReport {
    /// Whether every check passed.
    pub fn passed(&self) -> bool {
        self.checks.iter().all(CheckResult::passed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &CheckResult> {
        self.checks.iter().filter(|c| !c.passed())
    }
}

type Check = fn(&dyn TranslationDriver, &Scratch) -> Result<(), String>;

const CHECKS: [(&str, Check); 7] = [
    ("round_trip", round_trip),
    ("put_replaces", put_replaces),
    ("patch_merges", patch_merges),
    ("get_many_covers_all", get_many_covers_all),
    ("available_languages", available_languages),
    ("delete_attributes_prunes", delete_attributes_prunes),
    ("delete_all", delete_all),
];

struct Scratch {
    entity: EntityRef,
    other: EntityRef,
    primary: Language,
    secondary: Language,
}

impl Scratch {
    fn new() -> Result<Self, String> {
        let stem = Uuid::now_v7().simple().to_string();
        let entity = |suffix: &str| {
            EntityRef::new(SCRATCH_TYPE, format!("{stem}-{suffix}")).map_err(|e| e.to_string())
        };
        let language = |tag: &str| Language::new(tag).map_err(|e| e.to_string());
        Ok(Self {
            entity: entity("a")?,
            other: entity("b")?,
            primary: language("en")?,
            secondary: language("fr")?,
        })
    }

    fn cleanup(&self, driver: &dyn TranslationDriver) {
        for entity in [&self.entity, &self.other] {
            if let Err(e) = driver.delete_all(entity) {
                warn!(driver = driver.name(), %entity, error = %e, "failed to clean up scratch entity");
            }
        }
    }
}

/// Run every conformance check against `driver`.
///
/// Scratch data is deleted before each check and again at the end.
pub fn check(driver: &dyn TranslationDriver) -> ConformanceReport {
    let mut checks = Vec::with_capacity(CHECKS.len());
    match Scratch::new() {
        Ok(scratch) => {
            for (name, run) in CHECKS {
                scratch.cleanup(driver);
                let failure = run(driver, &scratch).err();
                debug!(driver = driver.name(), check = name, passed = failure.is_none(), "conformance check");
                checks.push(CheckResult { name, failure });
            }
            scratch.cleanup(driver);
        }
        Err(reason) => checks.push(CheckResult {
            name: "setup",
            failure: Some(reason),
        }),
    }
    ConformanceReport {
        driver: driver.name().to_string(),
        checks,
    }
}

fn attrs(pairs: &[(&str, &str)]) -> AttributeMap {
    pairs.iter().copied().collect()
}

fn expect_eq<T: PartialEq + std::fmt::Debug>(what: &str, actual: T, expected: T) -> Result<(), String> {
    if actual == expected {
        Ok(())
    } else {
        Err(format!("{what}: expected {expected:?}, got {actual:?}"))
    }
}

fn round_trip(driver: &dyn TranslationDriver, p: &Scratch) -> Result<(), String> {
    let a = attrs(&[("title", "Sample"), ("body", "Text")]);
    driver.store(&p.entity, &p.primary, &a).map_err(|e| e.to_string())?;
    let got = driver.get(&p.entity, &p.primary).map_err(|e| e.to_string())?;
    expect_eq("get after store", got, a)?;
    let missing = driver.get(&p.entity, &p.secondary).map_err(|e| e.to_string())?;
    expect_eq("get of missing language", missing, AttributeMap::new())
}

fn put_replaces(driver: &dyn TranslationDriver, p: &Scratch) -> Result<(), String> {
    driver
        .store(&p.entity, &p.primary, &attrs(&[("a", "1"), ("b", "2")]))
        .map_err(|e| e.to_string())?;
    driver
        .put(&p.entity, &p.primary, &attrs(&[("a", "9")]))
        .map_err(|e| e.to_string())?;
    let got = driver.get(&p.entity, &p.primary).map_err(|e| e.to_string())?;
    expect_eq("get after put", got, attrs(&[("a", "9")]))
}

fn patch_merges(driver: &dyn TranslationDriver, p: &Scratch) -> Result<(), String> {
    driver
        .store(&p.entity, &p.primary, &attrs(&[("a", "1"), ("b", "2")]))
        .map_err(|e| e.to_string())?;
    driver
        .patch(&p.entity, &p.primary, &attrs(&[("a", "9")]))
        .map_err(|e| e.to_string())?;
    let got = driver.get(&p.entity, &p.primary).map_err(|e| e.to_string())?;
    expect_eq("get after patch", got, attrs(&[("a", "9"), ("b", "2")]))
}

fn get_many_covers_all(driver: &dyn TranslationDriver, p: &Scratch) -> Result<(), String> {
    driver
        .store(&p.entity, &p.primary, &attrs(&[("t", "x")]))
        .map_err(|e| e.to_string())?;
    let all = driver
        .get_many(&[p.entity.clone(), p.other.clone()], &p.primary)
        .map_err(|e| e.to_string())?;
    expect_eq("get_many size", all.len(), 2)?;
    expect_eq(
        "get_many of missing entity",
        all.get(p.other.entity_id()).cloned(),
        Some(AttributeMap::new()),
    )
}

fn available_languages(driver: &dyn TranslationDriver, p: &Scratch) -> Result<(), String> {
    for language in [&p.primary, &p.secondary] {
        driver
            .store(&p.entity, language, &attrs(&[("t", "x")]))
            .map_err(|e| e.to_string())?;
    }
    let mut languages = driver.available_languages(&p.entity).map_err(|e| e.to_string())?;
    languages.sort();
    expect_eq("available languages", languages, vec![p.primary.clone(), p.secondary.clone()])
}

fn delete_attributes_prunes(driver: &dyn TranslationDriver, p: &Scratch) -> Result<(), String> {
    driver
        .store(&p.entity, &p.primary, &attrs(&[("only", "x")]))
        .map_err(|e| e.to_string())?;
    driver
        .store(&p.entity, &p.secondary, &attrs(&[("only", "x"), ("kept", "y")]))
        .map_err(|e| e.to_string())?;
    driver
        .delete_attributes(&p.entity, &["only"], None)
        .map_err(|e| e.to_string())?;

    let languages = driver.available_languages(&p.entity).map_err(|e| e.to_string())?;
    expect_eq("languages after attribute delete", languages, vec![p.secondary.clone()])?;
    let kept = driver.get(&p.entity, &p.secondary).map_err(|e| e.to_string())?;
    expect_eq("surviving attributes", kept, attrs(&[("kept", "y")]))
}

fn delete_all(driver: &dyn TranslationDriver, p: &Scratch) -> Result<(), String> {
    for language in [&p.primary, &p.secondary] {
        driver
            .store(&p.entity, language, &attrs(&[("t", "x")]))
            .map_err(|e| e.to_string())?;
    }
    driver
        .delete_languages(&p.entity, &[p.secondary.clone()])
        .map_err(|e| e.to_string())?;
    let languages = driver.available_languages(&p.entity).map_err(|e| e.to_string())?;
    expect_eq("languages after delete_languages", languages, vec![p.primary.clone()])?;

    driver.delete_all(&p.entity).map_err(|e| e.to_string())?;
    let languages = driver.available_languages(&p.entity).map_err(|e| e.to_string())?;
    expect_eq("languages after delete_all", languages, Vec::new())?;
    let got = driver.get(&p.entity, &p.primary).map_err(|e| e.to_string())?;
    expect_eq("get after delete_all", got, AttributeMap::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::ArrayTranslationDriver;
    use crate::config::IndexMode;
    use crate::error::DriverResult;
    use crate::json::JsonTranslationDriver;
    use lingo_store::{FsKeyValueStore, InMemoryKeyValueStore};
    use std::collections::BTreeMap;
    use std::sync::Arc;

    #[test]
    fn builtin_drivers_conform() {
        let dir = tempfile::tempdir().unwrap();
        let drivers: Vec<Box<dyn TranslationDriver>> = vec![
            Box::new(ArrayTranslationDriver::new()),
            Box::new(JsonTranslationDriver::inline(
                Arc::new(InMemoryKeyValueStore::new()),
                IndexMode::Indexed,
            )),
            Box::new(JsonTranslationDriver::inline(
                Arc::new(FsKeyValueStore::open(dir.path()).unwrap()),
                IndexMode::Scan,
            )),
        ];
        for driver in &drivers {
            let report = check(driver.as_ref());
            let failures: Vec<_> = report.failures().collect();
            assert!(report.passed(), "{} failed: {failures:?}", report.driver);
            assert_eq!(report.checks.len(), CHECKS.len());
        }
    }

    #[test]
    fn scratch_entities_never_repeat() {
        let a = Scratch::new().unwrap();
        let b = Scratch::new().unwrap();
        assert_ne!(a.entity, b.entity);
        assert_ne!(a.entity, a.other);
        assert_eq!(a.entity.entity_type(), SCRATCH_TYPE);
    }

    #[test]
    fn scratch_data_is_cleaned_up() {
        let kv = Arc::new(InMemoryKeyValueStore::new());
        let driver = JsonTranslationDriver::inline(kv.clone(), IndexMode::Indexed);
        assert!(check(&driver).passed());
        assert!(kv.is_empty());
    }

    /// Silently drops patches.
    struct ForgetfulDriver(ArrayTranslationDriver);

    impl TranslationDriver for ForgetfulDriver {
        fn name(&self) -> &str {
            "forgetful"
        }
        fn store(&self, e: &EntityRef, l: &Language, a: &AttributeMap) -> DriverResult<()> {
            self.0.store(e, l, a)
        }
        fn get(&self, e: &EntityRef, l: &Language) -> DriverResult<AttributeMap> {
            self.0.get(e, l)
        }
        fn get_many(&self, e: &[EntityRef], l: &Language) -> DriverResult<BTreeMap<String, AttributeMap>> {
            self.0.get_many(e, l)
        }
        fn available_languages(&self, e: &EntityRef) -> DriverResult<Vec<Language>> {
            self.0.available_languages(e)
        }
        fn models_available_in_language(&self, t: &str, l: &Language) -> DriverResult<Vec<String>> {
            self.0.models_available_in_language(t, l)
        }
        fn put(&self, e: &EntityRef, l: &Language, a: &AttributeMap) -> DriverResult<()> {
            self.0.put(e, l, a)
        }
        fn patch(&self, _: &EntityRef, _: &Language, _: &AttributeMap) -> DriverResult<()> {
            Ok(())
        }
        fn delete_all(&self, e: &EntityRef) -> DriverResult<()> {
            self.0.delete_all(e)
        }
        fn delete_languages(&self, e: &EntityRef, l: &[Language]) -> DriverResult<()> {
            self.0.delete_languages(e, l)
        }
        fn delete_attributes(&self, e: &EntityRef, a: &[&str], l: Option<&Language>) -> DriverResult<()> {
            self.0.delete_attributes(e, a, l)
        }
    }

    #[test]
    fn broken_driver_is_reported() {
        let report = check(&ForgetfulDriver(ArrayTranslationDriver::new()));
        assert!(!report.passed());
        let failed: Vec<&str> = report.failures().map(|c| c.name).collect();
        assert_eq!(failed, vec!["patch_merges"]);
    }
}
