use std::collections::BTreeMap;
use std::sync::RwLock;

use lingo_store::compare_ids;
use lingo_types::{AttributeMap, EntityRef, Language};

use crate::contract::TranslationDriver;
use crate::error::{poisoned, DriverResult};

/// entity type -> entity id -> language -> attributes
type Translations = BTreeMap<String, BTreeMap<String, BTreeMap<Language, AttributeMap>>>;

/// In-memory translation driver for tests.
///
/// Applies the same pruning rule as the JSON driver (a blob left empty is
/// removed, and so is an entity with no blobs left) and answers reverse
/// lookups by scanning, so it never goes stale. The `assert_*` helpers
/// panic with a descriptive message, for use inside tests.
#[derive(Default)]
pub struct ArrayTranslationDriver {
    translations: RwLock<Translations>,
}

impl ArrayTranslationDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored (entity, language) blobs.
    pub fn blob_count(&self) -> usize {
        self.translations
            .read()
            .map(|t| {
                t.values()
                    .flat_map(|ids| ids.values())
                    .map(BTreeMap::len)
                    .sum()
            })
            .unwrap_or(0)
    }

    /// Panics unless `entity` has a non-null `attribute` in `language`.
    pub fn assert_has_translation(&self, entity: &EntityRef, attribute: &str, language: &Language) {
        assert!(
            self.translation(entity, attribute, language).is_some(),
            "{entity}'s {attribute} was not translated to {language}"
        );
    }

    /// Panics if `entity` has a non-null `attribute` in `language`.
    pub fn assert_missing_translation(&self, entity: &EntityRef, attribute: &str, language: &Language) {
        assert!(
            self.translation(entity, attribute, language).is_none(),
            "{entity} has {attribute} translated to {language}"
        );
    }

    /// Panics unless `entity`'s `attribute` in `language` equals `expected`.
    pub fn assert_translation(
        &self,
        entity: &EntityRef,
        attribute: &str,
        language: &Language,
        expected: &str,
    ) {
        let Some(actual) = self.translation(entity, attribute, language) else {
            panic!("the requested translation does not exist: {entity} {attribute} in {language}");
        };
        assert_eq!(
            actual, expected,
            "{entity}'s {attribute} was translated as {actual:?} instead of the expected {expected:?}"
        );
    }

    fn translation(&self, entity: &EntityRef, attribute: &str, language: &Language) -> Option<String> {
        let translations = self.translations.read().ok()?;
        translations
            .get(entity.entity_type())?
            .get(entity.entity_id())?
            .get(language)?
            .get(attribute)?
            .map(str::to_string)
    }

    /// Run `mutate` on `entity`'s language map, then prune whatever it left
    /// empty.
    fn mutate_entity<F>(&self, entity: &EntityRef, mutate: F) -> DriverResult<()>
    where
        F: FnOnce(&mut BTreeMap<Language, AttributeMap>),
    {
        let mut translations = self.translations.write().map_err(poisoned)?;
        let ids = translations.entry(entity.entity_type().to_string()).or_default();
        let languages = ids.entry(entity.entity_id().to_string()).or_default();

        mutate(languages);
        languages.retain(|_, attributes| !attributes.is_empty());

        if languages.is_empty() {
            ids.remove(entity.entity_id());
        }
        if ids.is_empty() {
            translations.remove(entity.entity_type());
        }
        Ok(())
    }
}

impl TranslationDriver for ArrayTranslationDriver {
    fn name(&self) -> &str {
        "array"
    }

    fn store(&self, entity: &EntityRef, language: &Language, attributes: &AttributeMap) -> DriverResult<()> {
        self.mutate_entity(entity, |languages| {
            languages.insert(language.clone(), attributes.clone());
        })
    }

    fn get(&self, entity: &EntityRef, language: &Language) -> DriverResult<AttributeMap> {
        let translations = self.translations.read().map_err(poisoned)?;
        Ok(translations
            .get(entity.entity_type())
            .and_then(|ids| ids.get(entity.entity_id()))
            .and_then(|languages| languages.get(language))
            .cloned()
            .unwrap_or_default())
    }

    fn get_many(
        &self,
        entities: &[EntityRef],
        language: &Language,
    ) -> DriverResult<BTreeMap<String, AttributeMap>> {
        entities
            .iter()
            .map(|entity| Ok((entity.entity_id().to_string(), self.get(entity, language)?)))
            .collect()
    }

    fn available_languages(&self, entity: &EntityRef) -> DriverResult<Vec<Language>> {
        let translations = self.translations.read().map_err(poisoned)?;
        Ok(translations
            .get(entity.entity_type())
            .and_then(|ids| ids.get(entity.entity_id()))
            .map(|languages| languages.keys().cloned().collect())
            .unwrap_or_default())
    }

    fn models_available_in_language(&self, entity_type: &str, language: &Language) -> DriverResult<Vec<String>> {
        let translations = self.translations.read().map_err(poisoned)?;
        let mut ids: Vec<String> = translations
            .get(entity_type)
            .map(|ids| {
                ids.iter()
                    .filter(|(_, languages)| languages.contains_key(language))
                    .map(|(id, _)| id.clone())
                    .collect()
            })
            .unwrap_or_default();
        ids.sort_by(|a, b| compare_ids(a, b));
        Ok(ids)
    }

    fn put(&self, entity: &EntityRef, language: &Language, attributes: &AttributeMap) -> DriverResult<()> {
        self.store(entity, language, attributes)
    }

    fn patch(&self, entity: &EntityRef, language: &Language, attributes: &AttributeMap) -> DriverResult<()> {
        self.mutate_entity(entity, |languages| {
            languages.entry(language.clone()).or_default().merge(attributes);
        })
    }

    fn delete_all(&self, entity: &EntityRef) -> DriverResult<()> {
        self.mutate_entity(entity, BTreeMap::clear)
    }

    fn delete_languages(&self, entity: &EntityRef, languages: &[Language]) -> DriverResult<()> {
        self.mutate_entity(entity, |present| {
            for language in languages {
                present.remove(language);
            }
        })
    }

    fn delete_attributes(
        &self,
        entity: &EntityRef,
        attributes: &[&str],
        language: Option<&Language>,
    ) -> DriverResult<()> {
        self.mutate_entity(entity, |present| {
            for (tag, blob) in present.iter_mut() {
                if language.is_some_and(|l| l != tag) {
                    continue;
                }
                *blob = blob.without(attributes);
            }
        })
    }
}

impl std::fmt::Debug for ArrayTranslationDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArrayTranslationDriver")
            .field("blob_count", &self.blob_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article(id: &str) -> EntityRef {
        EntityRef::new("App\\Article", id).unwrap()
    }

    fn lang(tag: &str) -> Language {
        Language::new(tag).unwrap()
    }

    fn attrs(pairs: &[(&str, &str)]) -> AttributeMap {
        pairs.iter().copied().collect()
    }

    #[test]
    fn store_get_patch_put() {
        let driver = ArrayTranslationDriver::new();
        let e = article("1");
        driver.store(&e, &lang("en"), &attrs(&[("a", "1"), ("b", "2")])).unwrap();
        driver.patch(&e, &lang("en"), &attrs(&[("a", "9")])).unwrap();
        assert_eq!(driver.get(&e, &lang("en")).unwrap(), attrs(&[("a", "9"), ("b", "2")]));

        driver.put(&e, &lang("en"), &attrs(&[("c", "3")])).unwrap();
        assert_eq!(driver.get(&e, &lang("en")).unwrap(), attrs(&[("c", "3")]));
        assert!(driver.get(&e, &lang("fr")).unwrap().is_empty());
    }

    #[test]
    fn pruning_matches_json_driver() {
        let driver = ArrayTranslationDriver::new();
        let e = article("1");
        driver.store(&e, &lang("en"), &attrs(&[("a", "1")])).unwrap();
        driver.store(&e, &lang("fr"), &attrs(&[("a", "1"), ("b", "2")])).unwrap();

        driver.delete_attributes(&e, &["a"], None).unwrap();
        assert_eq!(driver.available_languages(&e).unwrap(), vec![lang("fr")]);
        assert_eq!(driver.blob_count(), 1);

        driver.store(&e, &lang("fr"), &AttributeMap::new()).unwrap();
        assert_eq!(driver.blob_count(), 0);
        assert!(driver.models_available_in_language("App\\Article", &lang("fr")).unwrap().is_empty());
    }

    #[test]
    fn reverse_lookup_is_naturally_ordered() {
        let driver = ArrayTranslationDriver::new();
        for id in ["10", "2", "1"] {
            driver.store(&article(id), &lang("en"), &attrs(&[("t", id)])).unwrap();
        }
        driver.delete_languages(&article("2"), &[lang("en")]).unwrap();
        assert_eq!(
            driver.models_available_in_language("App\\Article", &lang("en")).unwrap(),
            vec!["1", "10"]
        );
    }

    #[test]
    fn get_many_covers_every_entity() {
        let driver = ArrayTranslationDriver::new();
        driver.store(&article("1"), &lang("en"), &attrs(&[("t", "x")])).unwrap();
        let all = driver.get_many(&[article("1"), article("2")], &lang("en")).unwrap();
        assert_eq!(all.len(), 2);
        assert!(all["2"].is_empty());
    }

    #[test]
    fn assertion_helpers() {
        let driver = ArrayTranslationDriver::new();
        let e = article("1");
        driver.store(&e, &lang("en"), &attrs(&[("title", "Hello")])).unwrap();

        driver.assert_has_translation(&e, "title", &lang("en"));
        driver.assert_missing_translation(&e, "title", &lang("fr"));
        driver.assert_missing_translation(&e, "body", &lang("en"));
        driver.assert_translation(&e, "title", &lang("en"), "Hello");
    }

    #[test]
    #[should_panic(expected = "instead of the expected")]
    fn assert_translation_reports_mismatch() {
        let driver = ArrayTranslationDriver::new();
        let e = article("1");
        driver.store(&e, &lang("en"), &attrs(&[("title", "Hello")])).unwrap();
        driver.assert_translation(&e, "title", &lang("en"), "Bonjour");
    }

    #[test]
    #[should_panic(expected = "does not exist")]
    fn assert_translation_on_missing_attribute_panics() {
        ArrayTranslationDriver::new().assert_translation(&article("1"), "title", &lang("en"), "x");
    }
}
