//! Country and nationality to ISO 3166-1 alpha-3 code tables

use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::warn;

/// Code stored when no country name is given at all
pub const UNKNOWN_COUNTRY_CODE: &str = "UNK";

/// Country names and aliases as they appear upstream
const COUNTRIES: &[(&str, &str)] = &[
    // Aliases seen in circuit locations
    ("UK", "GBR"),
    ("United Kingdom", "GBR"),
    ("Great Britain", "GBR"),
    ("England", "GBR"),
    ("Scotland", "GBR"),
    ("Wales", "GBR"),
    ("USA", "USA"),
    ("United States", "USA"),
    ("United States of America", "USA"),
    ("UAE", "ARE"),
    ("United Arab Emirates", "ARE"),
    ("Korea", "KOR"),
    ("South Korea", "KOR"),
    ("North Korea", "PRK"),
    ("Europe", "EUR"),
    ("Russia", "RUS"),
    ("Russian Federation", "RUS"),
    ("Czech Republic", "CZE"),
    ("Czechia", "CZE"),
    ("Holland", "NLD"),
    ("Netherlands", "NLD"),
    ("The Netherlands", "NLD"),
    ("Vietnam", "VNM"),
    ("Viet Nam", "VNM"),
    ("Turkey", "TUR"),
    ("Türkiye", "TUR"),
    ("Ivory Coast", "CIV"),
    ("Côte d'Ivoire", "CIV"),
    ("East Timor", "TLS"),
    ("Timor-Leste", "TLS"),
    ("Swaziland", "SWZ"),
    ("Eswatini", "SWZ"),
    ("Burma", "MMR"),
    ("Myanmar", "MMR"),
    ("Persia", "IRN"),
    ("Iran", "IRN"),
    ("Ceylon", "LKA"),
    ("Sri Lanka", "LKA"),
    ("Rhodesia", "ZWE"),
    ("Zimbabwe", "ZWE"),
    ("Yugoslavia", "SRB"),
    ("Serbia", "SRB"),
    ("Soviet Union", "RUS"),
    ("USSR", "RUS"),
    ("East Germany", "DEU"),
    ("West Germany", "DEU"),
    ("Germany", "DEU"),
    // Europe
    ("Albania", "ALB"),
    ("Andorra", "AND"),
    ("Austria", "AUT"),
    ("Belarus", "BLR"),
    ("Belgium", "BEL"),
    ("Bosnia and Herzegovina", "BIH"),
    ("Bulgaria", "BGR"),
    ("Croatia", "HRV"),
    ("Cyprus", "CYP"),
    ("Denmark", "DNK"),
    ("Estonia", "EST"),
    ("Finland", "FIN"),
    ("France", "FRA"),
    ("Greece", "GRC"),
    ("Hungary", "HUN"),
    ("Iceland", "ISL"),
    ("Ireland", "IRL"),
    ("Italy", "ITA"),
    ("Kosovo", "XKX"),
    ("Latvia", "LVA"),
    ("Liechtenstein", "LIE"),
    ("Lithuania", "LTU"),
    ("Luxembourg", "LUX"),
    ("Malta", "MLT"),
    ("Moldova", "MDA"),
    ("Monaco", "MCO"),
    ("Montenegro", "MNE"),
    ("North Macedonia", "MKD"),
    ("Norway", "NOR"),
    ("Poland", "POL"),
    ("Portugal", "PRT"),
    ("Romania", "ROU"),
    ("San Marino", "SMR"),
    ("Slovakia", "SVK"),
    ("Slovenia", "SVN"),
    ("Spain", "ESP"),
    ("Sweden", "SWE"),
    ("Switzerland", "CHE"),
    ("Ukraine", "UKR"),
    ("Vatican City", "VAT"),
    // Americas
    ("Antigua and Barbuda", "ATG"),
    ("Argentina", "ARG"),
    ("Bahamas", "BHS"),
    ("Barbados", "BRB"),
    ("Belize", "BLZ"),
    ("Bolivia", "BOL"),
    ("Brazil", "BRA"),
    ("Canada", "CAN"),
    ("Chile", "CHL"),
    ("Colombia", "COL"),
    ("Costa Rica", "CRI"),
    ("Cuba", "CUB"),
    ("Dominican Republic", "DOM"),
    ("Ecuador", "ECU"),
    ("El Salvador", "SLV"),
    ("Guatemala", "GTM"),
    ("Guyana", "GUY"),
    ("Haiti", "HTI"),
    ("Honduras", "HND"),
    ("Jamaica", "JAM"),
    ("Mexico", "MEX"),
    ("Nicaragua", "NIC"),
    ("Panama", "PAN"),
    ("Paraguay", "PRY"),
    ("Peru", "PER"),
    ("Puerto Rico", "PRI"),
    ("Saint Vincent and the Grenadines", "VCT"),
    ("Suriname", "SUR"),
    ("Trinidad and Tobago", "TTO"),
    ("Uruguay", "URY"),
    ("Venezuela", "VEN"),
    // Asia and the Middle East
    ("Afghanistan", "AFG"),
    ("Armenia", "ARM"),
    ("Azerbaijan", "AZE"),
    ("Bahrain", "BHR"),
    ("Bangladesh", "BGD"),
    ("Bhutan", "BTN"),
    ("Brunei", "BRN"),
    ("Cambodia", "KHM"),
    ("China", "CHN"),
    ("Georgia", "GEO"),
    ("Hong Kong", "HKG"),
    ("India", "IND"),
    ("Indonesia", "IDN"),
    ("Iraq", "IRQ"),
    ("Israel", "ISR"),
    ("Japan", "JPN"),
    ("Jordan", "JOR"),
    ("Kazakhstan", "KAZ"),
    ("Kuwait", "KWT"),
    ("Kyrgyzstan", "KGZ"),
    ("Laos", "LAO"),
    ("Lebanon", "LBN"),
    ("Macau", "MAC"),
    ("Malaysia", "MYS"),
    ("Maldives", "MDV"),
    ("Mongolia", "MNG"),
    ("Nepal", "NPL"),
    ("Oman", "OMN"),
    ("Pakistan", "PAK"),
    ("Philippines", "PHL"),
    ("Qatar", "QAT"),
    ("Saudi Arabia", "SAU"),
    ("Singapore", "SGP"),
    ("Syria", "SYR"),
    ("Taiwan", "TWN"),
    ("Tajikistan", "TJK"),
    ("Thailand", "THA"),
    ("Turkmenistan", "TKM"),
    ("Uzbekistan", "UZB"),
    ("Yemen", "YEM"),
    // Africa
    ("Algeria", "DZA"),
    ("Angola", "AGO"),
    ("Botswana", "BWA"),
    ("Cameroon", "CMR"),
    ("Central African Republic", "CAF"),
    ("Democratic Republic of the Congo", "COD"),
    ("DR Congo", "COD"),
    ("Republic of the Congo", "COG"),
    ("Congo", "COG"),
    ("Egypt", "EGY"),
    ("Equatorial Guinea", "GNQ"),
    ("Ethiopia", "ETH"),
    ("Ghana", "GHA"),
    ("Guinea-Bissau", "GNB"),
    ("Kenya", "KEN"),
    ("Libya", "LBY"),
    ("Madagascar", "MDG"),
    ("Mauritius", "MUS"),
    ("Morocco", "MAR"),
    ("Mozambique", "MOZ"),
    ("Namibia", "NAM"),
    ("Nigeria", "NGA"),
    ("Rwanda", "RWA"),
    ("São Tomé and Príncipe", "STP"),
    ("Sao Tome and Principe", "STP"),
    ("Senegal", "SEN"),
    ("South Africa", "ZAF"),
    ("Sudan", "SDN"),
    ("Tanzania", "TZA"),
    ("Tunisia", "TUN"),
    ("Uganda", "UGA"),
    ("Zambia", "ZMB"),
    // Oceania
    ("Australia", "AUS"),
    ("Fiji", "FJI"),
    ("Marshall Islands", "MHL"),
    ("Nauru", "NRU"),
    ("New Zealand", "NZL"),
    ("Papua New Guinea", "PNG"),
    ("Samoa", "WSM"),
    ("Solomon Islands", "SLB"),
    ("Tonga", "TON"),
    ("Tuvalu", "TUV"),
    ("Vanuatu", "VUT"),
];

/// Demonyms used in driver and constructor records
const NATIONALITIES: &[(&str, &str)] = &[
    ("American", "USA"),
    ("American-Italian", "USA"),
    ("Argentine", "ARG"),
    ("Argentinian", "ARG"),
    ("Argentine-Italian", "ARG"),
    ("Australian", "AUS"),
    ("Austrian", "AUT"),
    ("Azerbaijani", "AZE"),
    ("Bahraini", "BHR"),
    ("Belgian", "BEL"),
    ("Bolivian", "BOL"),
    ("Brazilian", "BRA"),
    ("British", "GBR"),
    ("English", "GBR"),
    ("Scottish", "GBR"),
    ("Welsh", "GBR"),
    ("Northern Irish", "GBR"),
    ("Bulgarian", "BGR"),
    ("Burmese", "MMR"),
    ("Canadian", "CAN"),
    ("Central African", "CAF"),
    ("Ceylonese", "LKA"),
    ("Chilean", "CHL"),
    ("Chinese", "CHN"),
    ("Colombian", "COL"),
    ("Costa Rican", "CRI"),
    ("Croatian", "HRV"),
    ("Cuban", "CUB"),
    ("Czech", "CZE"),
    ("Danish", "DNK"),
    ("Dutch", "NLD"),
    ("Hollander", "NLD"),
    ("Netherlandish", "NLD"),
    ("East German", "DEU"),
    ("West German", "DEU"),
    ("German", "DEU"),
    ("Ecuadorian", "ECU"),
    ("Egyptian", "EGY"),
    ("Emirati", "ARE"),
    ("Equatorial Guinean", "GNQ"),
    ("Estonian", "EST"),
    ("Finnish", "FIN"),
    ("French", "FRA"),
    ("Greek", "GRC"),
    ("Hong Konger", "HKG"),
    ("Hungarian", "HUN"),
    ("Icelandic", "ISL"),
    ("Indian", "IND"),
    ("Indonesian", "IDN"),
    ("Iranian", "IRN"),
    ("Persian", "IRN"),
    ("Irish", "IRL"),
    ("Israeli", "ISR"),
    ("Italian", "ITA"),
    ("Jamaican", "JAM"),
    ("Japanese", "JPN"),
    ("Kazakh", "KAZ"),
    ("Kenyan", "KEN"),
    ("Latvian", "LVA"),
    ("Liechtensteiner", "LIE"),
    ("Lithuanian", "LTU"),
    ("Luxembourger", "LUX"),
    ("Luxembourgish", "LUX"),
    ("Malaysian", "MYS"),
    ("Maltese", "MLT"),
    ("Mexican", "MEX"),
    ("Monegasque", "MCO"),
    ("Monégasque", "MCO"),
    ("Moroccan", "MAR"),
    ("New Zealand", "NZL"),
    ("New Zealander", "NZL"),
    ("North Korean", "PRK"),
    ("South Korean", "KOR"),
    ("Korean", "KOR"),
    ("Norwegian", "NOR"),
    ("Papua New Guinean", "PNG"),
    ("Paraguayan", "PRY"),
    ("Peruvian", "PER"),
    ("Filipino", "PHL"),
    ("Polish", "POL"),
    ("Portuguese", "PRT"),
    ("Qatari", "QAT"),
    ("Rhodesian", "ZWE"),
    ("Zimbabwean", "ZWE"),
    ("Romanian", "ROU"),
    ("Russian", "RUS"),
    ("Soviet", "RUS"),
    ("Saudi", "SAU"),
    ("Saudi Arabian", "SAU"),
    ("Serbian", "SRB"),
    ("Yugoslav", "SRB"),
    ("Yugoslavian", "SRB"),
    ("Singaporean", "SGP"),
    ("Slovak", "SVK"),
    ("Slovenian", "SVN"),
    ("South African", "ZAF"),
    ("Spanish", "ESP"),
    ("Swedish", "SWE"),
    ("Swiss", "CHE"),
    ("Taiwanese", "TWN"),
    ("Thai", "THA"),
    ("Turkish", "TUR"),
    ("Ukrainian", "UKR"),
    ("Uruguayan", "URY"),
    ("Venezuelan", "VEN"),
    ("Vietnamese", "VNM"),
];

fn country_table() -> &'static HashMap<&'static str, &'static str> {
    static TABLE: OnceLock<HashMap<&'static str, &'static str>> = OnceLock::new();
    TABLE.get_or_init(|| COUNTRIES.iter().copied().collect())
}

fn nationality_table() -> &'static HashMap<&'static str, &'static str> {
    static TABLE: OnceLock<HashMap<&'static str, &'static str>> = OnceLock::new();
    TABLE.get_or_init(|| NATIONALITIES.iter().copied().collect())
}

/// Exact table lookup for a country name or alias
pub fn lookup_country(name: &str) -> Option<&'static str> {
    country_table().get(name.trim()).copied()
}

/// Resolve a country name to its three-letter code.
///
/// Unmapped names fall back to the first three characters in uppercase, which
/// can collide between countries; every fallback is logged.
pub fn resolve_country_code(name: &str) -> String {
    let name = name.trim();
    if name.is_empty() {
        return UNKNOWN_COUNTRY_CODE.to_string();
    }
    if let Some(code) = lookup_country(name) {
        return code.to_string();
    }

    let fallback: String = name.chars().take(3).collect::<String>().to_uppercase();
    warn!(country = name, code = %fallback, "Unmapped country name, using prefix code");
    fallback
}

/// Resolve a demonym (or a country name used as one) to a country code
pub fn resolve_nationality(nationality: &str) -> Option<String> {
    let nationality = nationality.trim();
    if nationality.is_empty() {
        return None;
    }
    nationality_table()
        .get(nationality)
        .or_else(|| country_table().get(nationality))
        .map(|code| code.to_string())
}

/// Display name for a code: the longest alias on record
pub fn country_name_for_code(code: &str) -> Option<&'static str> {
    COUNTRIES
        .iter()
        .filter(|(_, c)| *c == code)
        .map(|(name, _)| *name)
        .max_by_key(|name| name.chars().count())
}
