//! Country inference for records that arrive without one.
//!
//! Order of attempts: reference country names (longest first) scanned
//! over the joined address text, state-abbreviation tables (Australia,
//! US, Canada), the `WA` disambiguation, full Australian state names,
//! well-known world cities, and finally US territories.

/// Fallback country names used when no reference list is supplied.
const FALLBACK_COUNTRIES: [&str; 18] = [
    "United States",
    "Canada",
    "Mexico",
    "United Kingdom",
    "France",
    "Germany",
    "Italy",
    "Spain",
    "Switzerland",
    "Japan",
    "China",
    "Hong Kong",
    "Singapore",
    "Australia",
    "United Arab Emirates",
    "Saudi Arabia",
    "Brazil",
    "Argentina",
];

/// Common alternate spellings, attached when the main name is present.
const VARIATIONS: [(&str, &[&str]); 6] = [
    (
        "United States",
        &["USA", "US", "U.S.", "U.S.A.", "United States of America"],
    ),
    (
        "United Kingdom",
        &["UK", "U.K.", "Great Britain", "Britain", "England", "Scotland", "Wales"],
    ),
    ("United Arab Emirates", &["UAE", "U.A.E."]),
    ("South Korea", &["Korea", "Republic of Korea"]),
    ("Czech Republic", &["Czechia"]),
    ("Hong Kong", &["HK"]),
];

/// Australian state abbreviations, `WA` handled separately.
const AU_STATES: [&str; 7] = ["NSW", "VIC", "QLD", "SA", "TAS", "ACT", "NT"];

const US_STATES: [&str; 49] = [
    "AL", "AK", "AZ", "AR", "CA", "CO", "CT", "DE", "FL", "GA", "HI", "ID", "IL", "IN", "IA",
    "KS", "KY", "LA", "ME", "MD", "MA", "MI", "MN", "MS", "MO", "MT", "NE", "NV", "NH", "NJ",
    "NM", "NY", "NC", "ND", "OH", "OK", "OR", "PA", "RI", "SC", "SD", "TN", "TX", "UT", "VT",
    "VA", "WV", "WI", "WY",
];

const CA_PROVINCES: [&str; 13] = [
    "AB", "BC", "MB", "NB", "NL", "NS", "NT", "NU", "ON", "PE", "QC", "SK", "YT",
];

const AU_STATES_FULL: [&str; 8] = [
    "New South Wales",
    "Victoria",
    "Queensland",
    "Western Australia",
    "South Australia",
    "Tasmania",
    "Australian Capital Territory",
    "Northern Territory",
];

/// Cities known to sit in Western Australia; the only evidence accepted
/// for `WA` meaning Australia rather than Washington State.
const WESTERN_AUSTRALIA_CITIES: [&str; 5] =
    ["perth", "fremantle", "bunbury", "geraldton", "kalgoorlie"];

/// Well-known city → country pairs, the last resort before territories.
const CITY_COUNTRIES: [(&str, &str); 60] = [
    ("london", "United Kingdom"),
    ("paris", "France"),
    ("tokyo", "Japan"),
    ("berlin", "Germany"),
    ("rome", "Italy"),
    ("madrid", "Spain"),
    ("amsterdam", "Netherlands"),
    ("vienna", "Austria"),
    ("zurich", "Switzerland"),
    ("geneva", "Switzerland"),
    ("milan", "Italy"),
    ("barcelona", "Spain"),
    ("munich", "Germany"),
    ("frankfurt", "Germany"),
    ("brussels", "Belgium"),
    ("copenhagen", "Denmark"),
    ("stockholm", "Sweden"),
    ("oslo", "Norway"),
    ("helsinki", "Finland"),
    ("dublin", "Ireland"),
    ("lisbon", "Portugal"),
    ("athens", "Greece"),
    ("warsaw", "Poland"),
    ("prague", "Czech Republic"),
    ("budapest", "Hungary"),
    ("bucharest", "Romania"),
    ("sydney", "Australia"),
    ("melbourne", "Australia"),
    ("auckland", "New Zealand"),
    ("singapore", "Singapore"),
    ("hong kong", "Hong Kong"),
    ("dubai", "United Arab Emirates"),
    ("riyadh", "Saudi Arabia"),
    ("doha", "Qatar"),
    ("kuwait city", "Kuwait"),
    ("manama", "Bahrain"),
    ("muscat", "Oman"),
    ("tel aviv", "Israel"),
    ("istanbul", "Turkey"),
    ("cairo", "Egypt"),
    ("johannesburg", "South Africa"),
    ("cape town", "South Africa"),
    ("sao paulo", "Brazil"),
    ("rio de janeiro", "Brazil"),
    ("buenos aires", "Argentina"),
    ("santiago", "Chile"),
    ("lima", "Peru"),
    ("bogota", "Colombia"),
    ("mexico city", "Mexico"),
    ("moscow", "Russia"),
    ("beijing", "China"),
    ("shanghai", "China"),
    ("seoul", "South Korea"),
    ("taipei", "Taiwan"),
    ("bangkok", "Thailand"),
    ("kuala lumpur", "Malaysia"),
    ("jakarta", "Indonesia"),
    ("manila", "Philippines"),
    ("mumbai", "India"),
    ("delhi", "India"),
];

const US_TERRITORIES: [&str; 4] = ["saipan", "guam", "puerto rico", "us virgin islands"];

/// Infers a country from address fields. `reference_names` is the loaded
/// country reference list; the built-in fallback applies when empty.
#[must_use]
pub fn infer_country(
    address: &str,
    city: &str,
    state: &str,
    reference_names: &[String],
) -> Option<String> {
    let search_text = format!("{address} {city} {state}").to_lowercase();

    // Assemble the candidate name list: reference names plus alternate
    // spellings for those present.
    let mut names: Vec<String> = if reference_names.is_empty() {
        FALLBACK_COUNTRIES.iter().map(|s| (*s).to_owned()).collect()
    } else {
        reference_names.to_vec()
    };
    for (main, variations) in VARIATIONS {
        if names.iter().any(|n| n == main) {
            names.extend(variations.iter().map(|v| (*v).to_owned()));
        }
    }

    // Longest first, so "United States" beats "States" and full names
    // beat their substrings.
    names.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

    for name in &names {
        let lower = name.to_lowercase();
        if lower == "wales"
            && (search_text.contains("new south wales") || search_text.contains("south wales"))
        {
            continue;
        }
        if search_text.contains(&lower) {
            return Some(name.clone());
        }
    }

    let state_upper = state.trim().to_uppercase();
    if !state_upper.is_empty() {
        if AU_STATES.contains(&state_upper.as_str()) {
            return Some("Australia".to_owned());
        }
        if US_STATES.contains(&state_upper.as_str()) {
            return Some("United States".to_owned());
        }
        if state_upper == "WA" {
            return Some(disambiguate_wa(city));
        }
        if CA_PROVINCES.contains(&state_upper.as_str()) {
            return Some("Canada".to_owned());
        }
    }

    let state_trimmed = state.trim();
    if AU_STATES_FULL
        .iter()
        .any(|full| state_trimmed.eq_ignore_ascii_case(full))
    {
        return Some("Australia".to_owned());
    }
    let state_lower = state_trimmed.to_lowercase();
    if ["queensland", "new south wales", "western australia"]
        .iter()
        .any(|s| state_lower.contains(s))
    {
        return Some("Australia".to_owned());
    }

    let city_lower = city.trim().to_lowercase();
    if let Some((_, country)) = CITY_COUNTRIES.iter().find(|(c, _)| *c == city_lower) {
        return Some((*country).to_owned());
    }

    for territory in US_TERRITORIES {
        if search_text.contains(territory) {
            return Some("United States".to_owned());
        }
    }

    None
}

/// `WA` is Washington State unless the city is on the known
/// Western-Australia list. Australian WA stores in other cities get
/// misfiled as US — warn so they are visible in the log.
fn disambiguate_wa(city: &str) -> String {
    let city_lower = city.trim().to_lowercase();
    if WESTERN_AUSTRALIA_CITIES.contains(&city_lower.as_str()) {
        "Australia".to_owned()
    } else {
        if !city_lower.is_empty() {
            log::warn!(
                "State 'WA' with city '{city}' assumed to be US Washington; \
                 if this is Western Australia, supply the country explicitly"
            );
        }
        "United States".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference() -> Vec<String> {
        [
            "United States",
            "United Kingdom",
            "France",
            "Australia",
            "New Zealand",
            "Hong Kong",
        ]
        .iter()
        .map(|s| (*s).to_owned())
        .collect()
    }

    #[test]
    fn finds_country_name_in_address() {
        let country = infer_country("12 Rue de la Paix, France", "", "", &reference());
        assert_eq!(country.as_deref(), Some("France"));
    }

    #[test]
    fn longest_name_wins() {
        // "Wales" must not match inside "New South Wales".
        let country = infer_country("1 George St", "Sydney", "New South Wales", &reference());
        assert_eq!(country.as_deref(), Some("Australia"));
    }

    #[test]
    fn us_state_abbreviation() {
        let country = infer_country("1 Main St", "Springfield", "IL", &[]);
        assert_eq!(country.as_deref(), Some("United States"));
    }

    #[test]
    fn wa_defaults_to_us_washington() {
        let country = infer_country("100 Pike St", "Seattle", "WA", &[]);
        assert_eq!(country.as_deref(), Some("United States"));
    }

    #[test]
    fn wa_with_perth_is_australia() {
        let country = infer_country("5 Hay St", "Perth", "WA", &[]);
        assert_eq!(country.as_deref(), Some("Australia"));
    }

    #[test]
    fn canadian_province() {
        let country = infer_country("1 Bay St", "Toronto", "ON", &[]);
        assert_eq!(country.as_deref(), Some("Canada"));
    }

    #[test]
    fn world_capital_city() {
        let country = infer_country("", "Tokyo", "", &[]);
        assert_eq!(country.as_deref(), Some("Japan"));
    }

    #[test]
    fn us_territory() {
        let country = infer_country("Beach Rd", "Saipan", "", &[]);
        assert_eq!(country.as_deref(), Some("United States"));
    }

    #[test]
    fn unknown_address_yields_none() {
        assert_eq!(infer_country("Somewhere 1", "Nowhereville", "", &[]), None);
    }
}
