//! Weather special case of the search chain.
//!
//! Weather questions are answered from live conditions instead of web pages:
//! the location phrase is pulled out of the query, geocoded, and the current
//! conditions are rendered with a human-readable description of the WMO
//! weather code.

use super::{SearchHit, SearchTier};
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;

const GEOCODING_URL: &str = "https://geocoding-api.open-meteo.com/v1/search";
const FORECAST_URL: &str = "https://api.open-meteo.com/v1/forecast";

static WEATHER_INTENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(weather|forecast|temperature)\b").unwrap_or_else(|_| unreachable!())
});

static LOCATION_PHRASE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:weather|forecast|temperature)\b.*?\b(?:in|for|at)\s+(.+)")
        .unwrap_or_else(|_| unreachable!())
});

/// Words removed when no "in/for X" phrase is present.
const STRIP_WORDS: &[&str] = &[
    "what", "what's", "whats", "is", "the", "weather", "forecast", "temperature", "like", "in",
    "for", "at", "today", "tomorrow", "now", "right", "current", "currently", "tell", "me",
    "how", "how's", "hows", "please", "outside",
];

/// Trailing time words that are not part of a place name.
const TRAILING_WORDS: &[&str] = &["today", "tomorrow", "now", "tonight", "this week", "right now"];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Place {
    pub name: String,
    pub region: Option<String>,
    pub country: Option<String>,
    pub coordinates: Coordinates,
}

impl Place {
    pub fn display_name(&self) -> String {
        [Some(self.name.as_str()), self.region.as_deref(), self.country.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CurrentConditions {
    pub temperature_c: f64,
    pub humidity_percent: Option<f64>,
    pub wind_speed_kmh: Option<f64>,
    pub weather_code: u16,
}

/// Geocoding and current-conditions lookups.
#[async_trait]
pub trait WeatherService: Send + Sync {
    async fn geocode(&self, location: &str) -> Result<Place>;
    async fn current_conditions(&self, at: Coordinates) -> Result<CurrentConditions>;
}

/// True when the query asks about weather.
pub fn is_weather_query(query: &str) -> bool {
    WEATHER_INTENT.is_match(query)
}

/// Extracts the place name from a weather query.
///
/// "weather in X" / "forecast for X" is preferred; otherwise the known
/// keywords are stripped and whatever remains is used. The result is cut at
/// the first comma so "Springfield, Illinois" geocodes as "Springfield".
pub fn extract_location(query: &str) -> Option<String> {
    let candidate = match LOCATION_PHRASE.captures(query) {
        Some(caps) => caps.get(1).map(|m| m.as_str().to_string()).unwrap_or_default(),
        None => query
            .split_whitespace()
            .filter(|word| {
                let word = word.trim_matches(|c: char| !c.is_alphanumeric() && c != '\'');
                !STRIP_WORDS.contains(&word.to_lowercase().as_str())
            })
            .collect::<Vec<_>>()
            .join(" "),
    };

    let mut location = candidate
        .split(',')
        .next()
        .unwrap_or_default()
        .trim()
        .trim_end_matches(|c: char| c.is_ascii_punctuation())
        .trim()
        .to_string();

    loop {
        let lower = location.to_lowercase();
        let Some(word) = TRAILING_WORDS.iter().find(|w| lower.ends_with(&format!(" {}", w)))
        else {
            break;
        };
        location.truncate(location.len() - word.len() - 1);
        location = location.trim_end().to_string();
    }

    (!location.is_empty()).then_some(location)
}

/// Human-readable description of a WMO weather interpretation code.
pub fn describe_weather_code(code: u16) -> &'static str {
    match code {
        0 => "Clear sky",
        1 => "Mainly clear",
        2 => "Partly cloudy",
        3 => "Overcast",
        45 => "Fog",
        48 => "Depositing rime fog",
        51 => "Light drizzle",
        53 => "Moderate drizzle",
        55 => "Dense drizzle",
        61 => "Slight rain",
        63 => "Moderate rain",
        65 => "Heavy rain",
        71 => "Slight snow fall",
        73 => "Moderate snow fall",
        75 => "Heavy snow fall",
        77 => "Snow grains",
        80 => "Slight rain showers",
        81 => "Moderate rain showers",
        82 => "Violent rain showers",
        85 => "Slight snow showers",
        86 => "Heavy snow showers",
        95 => "Thunderstorm",
        96 => "Thunderstorm with slight hail",
        99 => "Thunderstorm with heavy hail",
        _ => "Unknown conditions",
    }
}

/// Search tier answering weather questions via a `WeatherService`.
pub struct WeatherTier<W> {
    service: W,
}

impl<W: WeatherService> WeatherTier<W> {
    pub fn new(service: W) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<W: WeatherService> SearchTier for WeatherTier<W> {
    fn name(&self) -> &str {
        "weather"
    }

    async fn search(&self, query: &str, _max_results: usize) -> Result<Vec<SearchHit>> {
        if !is_weather_query(query) {
            return Err(anyhow!("not a weather query"));
        }
        let location = extract_location(query).context("no location in weather query")?;
        let place = self.service.geocode(&location).await?;
        let now = self.service.current_conditions(place.coordinates).await?;

        let fahrenheit = now.temperature_c * 9.0 / 5.0 + 32.0;
        let mut snippet = format!(
            "{}, {:.1}°C ({:.1}°F)",
            describe_weather_code(now.weather_code),
            now.temperature_c,
            fahrenheit
        );
        if let Some(humidity) = now.humidity_percent {
            snippet.push_str(&format!(", humidity {:.0}%", humidity));
        }
        if let Some(wind) = now.wind_speed_kmh {
            snippet.push_str(&format!(", wind {:.1} km/h", wind));
        }

        Ok(vec![SearchHit {
            title: format!("Current weather in {}", place.display_name()),
            snippet,
            url: format!(
                "https://open-meteo.com/en/docs#latitude={}&longitude={}",
                place.coordinates.latitude, place.coordinates.longitude
            ),
        }])
    }
}

/// `WeatherService` backed by the keyless Open-Meteo APIs.
pub struct OpenMeteo {
    http: reqwest::Client,
}

impl OpenMeteo {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[derive(Deserialize)]
struct GeocodingResponse {
    #[serde(default)]
    results: Vec<GeocodingResult>,
}

#[derive(Deserialize)]
struct GeocodingResult {
    name: String,
    latitude: f64,
    longitude: f64,
    admin1: Option<String>,
    country: Option<String>,
}

#[derive(Deserialize)]
struct ForecastResponse {
    current: ForecastCurrent,
}

#[derive(Deserialize)]
struct ForecastCurrent {
    temperature_2m: f64,
    relative_humidity_2m: Option<f64>,
    wind_speed_10m: Option<f64>,
    weather_code: u16,
}

#[async_trait]
impl WeatherService for OpenMeteo {
    async fn geocode(&self, location: &str) -> Result<Place> {
        let response: GeocodingResponse = self
            .http
            .get(GEOCODING_URL)
            .query(&[("name", location), ("count", "1"), ("format", "json")])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .context("invalid geocoding response")?;
        let first = response
            .results
            .into_iter()
            .next()
            .with_context(|| format!("location '{}' not found", location))?;
        Ok(Place {
            name: first.name,
            region: first.admin1,
            country: first.country,
            coordinates: Coordinates {
                latitude: first.latitude,
                longitude: first.longitude,
            },
        })
    }

    async fn current_conditions(&self, at: Coordinates) -> Result<CurrentConditions> {
        let response: ForecastResponse = self
            .http
            .get(FORECAST_URL)
            .query(&[
                ("latitude", at.latitude.to_string()),
                ("longitude", at.longitude.to_string()),
                (
                    "current",
                    "temperature_2m,relative_humidity_2m,wind_speed_10m,weather_code".to_string(),
                ),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .context("invalid forecast response")?;
        let current = response.current;
        Ok(CurrentConditions {
            temperature_c: current.temperature_2m,
            humidity_percent: current.relative_humidity_2m,
            wind_speed_kmh: current.wind_speed_10m,
            weather_code: current.weather_code,
        })
    }
}
