use std::collections::HashMap;

use nomad_config::HotelProfile;

pub const DEFAULT_HOTEL_ID: &str = "default";

/// Read-only lookup of hotel knowledge.
pub trait HotelDirectory: Send + Sync {
    /// Profile for `hotel_id`, falling back to the default hotel.
    fn profile(&self, hotel_id: Option<&str>) -> HotelProfile;
}

/// Directory backed by the `[hotels]` config table.
pub struct StaticHotelDirectory {
    hotels: HashMap<String, HotelProfile>,
}

impl StaticHotelDirectory {
    pub fn new(hotels: HashMap<String, HotelProfile>) -> Self {
        Self { hotels }
    }
}

impl HotelDirectory for StaticHotelDirectory {
    fn profile(&self, hotel_id: Option<&str>) -> HotelProfile {
        hotel_id
            .and_then(|id| self.hotels.get(id))
            .or_else(|| self.hotels.get(DEFAULT_HOTEL_ID))
            .cloned()
            .unwrap_or_else(builtin_profile)
    }
}

/// Profile used when no hotel is configured at all.
pub fn builtin_profile() -> HotelProfile {
    HotelProfile {
        name: "NomadAI Hotel".to_string(),
        location: "the city center".to_string(),
        check_in: "3:00 PM".to_string(),
        check_out: "11:00 AM".to_string(),
        wifi_network: "NomadAI-Guest".to_string(),
        wifi_password: "Welcome2026!".to_string(),
        facts: vec![
            "Pool: open 6 AM - 10 PM daily".to_string(),
            "Gym: 24/7 access with room key".to_string(),
            "Spa: 9 AM - 9 PM, booking required".to_string(),
            "Restaurant: breakfast 6-10 AM, lunch 12-3 PM, dinner 6-10 PM".to_string(),
            "Bar: 5 PM - 1 AM".to_string(),
            "Parking: valet and self-parking available".to_string(),
        ],
    }
}

/// Human-readable language name for a client language code.
pub fn language_name(code: &str) -> &str {
    match code.trim().to_ascii_lowercase().split(['-', '_']).next() {
        Some("en") | None => "English",
        Some("es") => "Spanish",
        Some("fr") => "French",
        Some("de") => "German",
        Some("it") => "Italian",
        Some("pt") => "Portuguese",
        Some("ja") => "Japanese",
        Some("zh") => "Chinese",
        Some("ko") => "Korean",
        Some("th") => "Thai",
        Some("vi") => "Vietnamese",
        _ => code,
    }
}

/// Block of hotel facts shared by the system prompt and the skills.
pub fn knowledge_block(profile: &HotelProfile) -> String {
    let mut lines = vec![
        format!("Hotel: {} ({})", profile.name, profile.location),
        format!("Check-in: {}, check-out: {}", profile.check_in, profile.check_out),
    ];
    lines.extend(profile.facts.iter().map(|fact| format!("- {fact}")));
    lines.join("\n")
}

/// Concierge system prompt for one hotel and reply language. Recomputed on
/// every turn so a language switch takes effect immediately.
pub fn build_system_prompt(profile: &HotelProfile, language: &str) -> String {
    format!(
        "You are NomadAI, the virtual concierge of {name}. Help guests with room service, \
         housekeeping, amenities, wifi, local recommendations, itineraries and directions. \
         Use the available tools when a request needs them. Keep answers short and friendly, \
         suitable for being read aloud.\n\n{knowledge}\n\nAlways respond in {language}.",
        name = profile.name,
        knowledge = knowledge_block(profile),
        language = language_name(language),
    )
}
