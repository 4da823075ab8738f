/// Placeholder strings the directory uses when no city was provided.
const PLACEHOLDERS: [&str; 3] = ["No city", "Ввести город", "Город проживания"];

/// Literal corrections for known misspellings and regional variants.
const CORRECTIONS: [(&str, &str); 8] = [
    ("Санкт Петербург", "Санкт-Петербург"),
    ("г. Петергоф, г. Санкт-Петербург", "Санкт-Петербург"),
    ("Пермь/Санкт-Петербург", "Санкт-Петербург"),
    ("Электросталь (МО)", "Электросталь"),
    ("Орехово-Зуево, Московская обл.", "Орехово-Зуево"),
    ("Пушкино, Московская область", "Пушкино"),
    ("Белград, Сербия", "Белград"),
    ("Нови Сад, Сербия", "Нови Сад"),
];

/// Deterministic city-name normalizer applied before grouping and geocoding.
pub struct CityNormalizer;

impl CityNormalizer {
    /// Maps a raw city string to its canonical form.
    ///
    /// Returns `None` for missing/empty input and for the known placeholder
    /// strings; unmapped values pass through trimmed.
    pub fn normalize(raw: Option<&str>) -> Option<String> {
        let city = raw?.trim();
        if city.is_empty() || PLACEHOLDERS.contains(&city) {
            return None;
        }
        let canonical = CORRECTIONS
            .iter()
            .find(|(variant, _)| *variant == city)
            .map(|(_, canonical)| *canonical)
            .unwrap_or(city);
        Some(canonical.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corrections_map_to_canonical_names() {
        for (variant, canonical) in CORRECTIONS {
            assert_eq!(
                CityNormalizer::normalize(Some(variant)).as_deref(),
                Some(canonical)
            );
        }
    }

    #[test]
    fn placeholders_normalize_to_none() {
        for placeholder in PLACEHOLDERS {
            assert_eq!(CityNormalizer::normalize(Some(placeholder)), None);
        }
        assert_eq!(CityNormalizer::normalize(None), None);
        assert_eq!(CityNormalizer::normalize(Some("")), None);
        assert_eq!(CityNormalizer::normalize(Some("   ")), None);
    }

    #[test]
    fn unmapped_cities_pass_through_trimmed() {
        assert_eq!(
            CityNormalizer::normalize(Some("  Казань ")).as_deref(),
            Some("Казань")
        );
    }

    #[test]
    fn normalization_is_idempotent() {
        for raw in [
            "Санкт Петербург",
            "Пушкино, Московская область",
            "Казань",
            "No city",
        ] {
            let once = CityNormalizer::normalize(Some(raw));
            let twice = CityNormalizer::normalize(once.as_deref());
            assert_eq!(once, twice);
        }
    }
}
