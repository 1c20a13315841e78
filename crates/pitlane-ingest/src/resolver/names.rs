//! Name normalization for drivers and events

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Competition names that differ from the official name on record
const DRIVER_NAME_OVERRIDES: &[((&str, &str), (&str, &str))] = &[
    (("Nino", "Farina"), ("Giuseppe", "Farina")),
    (("Toulo", "de Graffenried"), ("Emmanuel", "de Graffenried")),
    (("Fon", "de Portago"), ("Alfonso", "de Portago")),
];

/// Replace a competition name by the official one when known
pub fn normalize_driver_name(first: &str, last: &str) -> (String, String) {
    let first = first.trim();
    let last = last.trim();
    DRIVER_NAME_OVERRIDES
        .iter()
        .find(|((f, l), _)| *f == first && *l == last)
        .map(|(_, (f, l))| (f.to_string(), l.to_string()))
        .unwrap_or_else(|| (first.to_string(), last.to_string()))
}

/// Strip diacritics and lowercase: "Pérez" becomes "perez"
pub fn fold(s: &str) -> String {
    s.nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
}

/// Lookup keys for a driver name, most specific first
pub fn name_keys(first: &str, last: &str) -> Vec<String> {
    let first = compact(&fold(first));
    let last = compact(&fold(last));
    let mut keys = Vec::with_capacity(4);
    if !first.is_empty() && !last.is_empty() {
        keys.push(format!("{}_{}", first, last));
        keys.push(format!("{}{}", first, last));
    }
    if !last.is_empty() {
        keys.push(last);
    }
    if !first.is_empty() {
        keys.push(first);
    }
    keys
}

/// Accent- and case-insensitive form of a meeting or race name
pub fn normalize_event_name(name: &str) -> String {
    fold(name).split_whitespace().collect::<Vec<_>>().join(" ")
}

fn compact(s: &str) -> String {
    s.chars().filter(|c| c.is_alphanumeric()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_farina_override() {
        assert_eq!(
            normalize_driver_name("Nino", "Farina"),
            ("Giuseppe".to_string(), "Farina".to_string())
        );
        assert_eq!(
            normalize_driver_name(" Lewis ", "Hamilton"),
            ("Lewis".to_string(), "Hamilton".to_string())
        );
    }

    #[test]
    fn test_name_keys_fold_diacritics() {
        assert_eq!(
            name_keys("Sergio", "Pérez"),
            vec!["sergio_perez", "sergioperez", "perez", "sergio"]
        );
        assert_eq!(name_keys("", "Räikkönen"), vec!["raikkonen"]);
        assert_eq!(name_keys("Nyck", "de Vries")[0], "nyck_devries");
    }

    #[test]
    fn test_event_names_match_across_accents() {
        assert_eq!(
            normalize_event_name("São Paulo  Grand Prix"),
            normalize_event_name("Sao Paulo Grand Prix")
        );
        assert_ne!(normalize_event_name("Mexico City Grand Prix"), normalize_event_name("Miami Grand Prix"));
    }
}
