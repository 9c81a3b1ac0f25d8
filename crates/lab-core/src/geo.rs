//! City/country/continent to lat/lon resolution.
//!
//! Pure lookup over a small built-in gazetteer with a bounded LRU in
//! front of it, since the same (city, country) pairs recur heavily
//! across a warehouse batch.

use moka::sync::Cache;

const CACHE_CAPACITY: u64 = 1024;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

struct GazetteerCity {
    city: &'static str,
    country: &'static str,
    population: u64,
    lat: f64,
    lon: f64,
}

struct CountryCapital {
    country: &'static str,
    lat: f64,
    lon: f64,
}

struct ContinentCentroid {
    continent: &'static str,
    lat: f64,
    lon: f64,
}

// A compact built-in gazetteer covering the cities and countries that
// actually show up in Xatu contributor geolocation data. Not exhaustive;
// the fallback chain exists precisely because it doesn't need to be.
const CITIES: &[GazetteerCity] = &[
    GazetteerCity { city: "London", country: "GB", population: 8_982_000, lat: 51.5074, lon: -0.1278 },
    GazetteerCity { city: "Paris", country: "FR", population: 2_148_000, lat: 48.8566, lon: 2.3522 },
    GazetteerCity { city: "Berlin", country: "DE", population: 3_645_000, lat: 52.5200, lon: 13.4050 },
    GazetteerCity { city: "Frankfurt", country: "DE", population: 753_000, lat: 50.1109, lon: 8.6821 },
    GazetteerCity { city: "Amsterdam", country: "NL", population: 872_000, lat: 52.3676, lon: 4.9041 },
    GazetteerCity { city: "New York", country: "US", population: 8_336_000, lat: 40.7128, lon: -74.0060 },
    GazetteerCity { city: "San Francisco", country: "US", population: 883_000, lat: 37.7749, lon: -122.4194 },
    GazetteerCity { city: "Los Angeles", country: "US", population: 3_979_000, lat: 34.0522, lon: -118.2437 },
    GazetteerCity { city: "Chicago", country: "US", population: 2_693_000, lat: 41.8781, lon: -87.6298 },
    GazetteerCity { city: "Tokyo", country: "JP", population: 13_960_000, lat: 35.6762, lon: 139.6503 },
    GazetteerCity { city: "Singapore", country: "SG", population: 5_686_000, lat: 1.3521, lon: 103.8198 },
    GazetteerCity { city: "Hong Kong", country: "HK", population: 7_482_000, lat: 22.3193, lon: 114.1694 },
    GazetteerCity { city: "Sydney", country: "AU", population: 5_312_000, lat: -33.8688, lon: 151.2093 },
    GazetteerCity { city: "Toronto", country: "CA", population: 2_930_000, lat: 43.6532, lon: -79.3832 },
    GazetteerCity { city: "Sao Paulo", country: "BR", population: 12_330_000, lat: -23.5505, lon: -46.6333 },
    GazetteerCity { city: "Warsaw", country: "PL", population: 1_790_000, lat: 52.2297, lon: 21.0122 },
    GazetteerCity { city: "Helsinki", country: "FI", population: 658_000, lat: 60.1699, lon: 24.9384 },
    GazetteerCity { city: "Zurich", country: "CH", population: 421_000, lat: 47.3769, lon: 8.5417 },
];

const CAPITALS: &[CountryCapital] = &[
    CountryCapital { country: "GB", lat: 51.5074, lon: -0.1278 },
    CountryCapital { country: "FR", lat: 48.8566, lon: 2.3522 },
    CountryCapital { country: "DE", lat: 52.5200, lon: 13.4050 },
    CountryCapital { country: "NL", lat: 52.3676, lon: 4.9041 },
    CountryCapital { country: "US", lat: 38.9072, lon: -77.0369 },
    CountryCapital { country: "JP", lat: 35.6895, lon: 139.6917 },
    CountryCapital { country: "SG", lat: 1.3521, lon: 103.8198 },
    CountryCapital { country: "AU", lat: -35.2809, lon: 149.1300 },
    CountryCapital { country: "CA", lat: 45.4215, lon: -75.6972 },
    CountryCapital { country: "BR", lat: -15.8267, lon: -47.9218 },
    CountryCapital { country: "PL", lat: 52.2297, lon: 21.0122 },
    CountryCapital { country: "FI", lat: 60.1699, lon: 24.9384 },
    CountryCapital { country: "CH", lat: 46.9480, lon: 7.4474 },
];

const CONTINENTS: &[ContinentCentroid] = &[
    ContinentCentroid { continent: "EU", lat: 54.5260, lon: 15.2551 },
    ContinentCentroid { continent: "NA", lat: 54.5260, lon: -105.2551 },
    ContinentCentroid { continent: "SA", lat: -8.7832, lon: -55.4915 },
    ContinentCentroid { continent: "AS", lat: 34.0479, lon: 100.6197 },
    ContinentCentroid { continent: "AF", lat: 8.7832, lon: 34.5085 },
    ContinentCentroid { continent: "OC", lat: -22.7359, lon: 140.0188 },
];

fn exact_city(city: &str, country: &str) -> Option<LatLon> {
    CITIES
        .iter()
        .find(|c| c.city.eq_ignore_ascii_case(city) && c.country.eq_ignore_ascii_case(country))
        .map(|c| LatLon { lat: c.lat, lon: c.lon })
}

fn most_populous_city_by_name(city: &str) -> Option<LatLon> {
    CITIES
        .iter()
        .filter(|c| c.city.eq_ignore_ascii_case(city))
        .max_by_key(|c| c.population)
        .map(|c| LatLon { lat: c.lat, lon: c.lon })
}

fn country_capital(country: &str) -> Option<LatLon> {
    CAPITALS
        .iter()
        .find(|c| c.country.eq_ignore_ascii_case(country))
        .map(|c| LatLon { lat: c.lat, lon: c.lon })
}

fn continent_centroid(continent: &str) -> Option<LatLon> {
    CONTINENTS
        .iter()
        .find(|c| c.continent.eq_ignore_ascii_case(continent))
        .map(|c| LatLon { lat: c.lat, lon: c.lon })
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
struct LookupKey {
    city: Option<String>,
    country: Option<String>,
    continent: Option<String>,
}

pub struct Geocoder {
    cache: Cache<LookupKey, Option<LatLon>>,
}

impl Default for Geocoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Geocoder {
    pub fn new() -> Self {
        Self {
            cache: Cache::new(CACHE_CAPACITY),
        }
    }

    /// Resolves (city, country, continent) to a point, trying each
    /// fallback in order and returning `None` only if nothing matches.
    pub fn resolve(
        &self,
        city: Option<&str>,
        country: Option<&str>,
        continent: Option<&str>,
    ) -> Option<LatLon> {
        let key = LookupKey {
            city: city.map(str::to_string),
            country: country.map(str::to_string),
            continent: continent.map(str::to_string),
        };

        if let Some(cached) = self.cache.get(&key) {
            return cached;
        }

        let resolved = (|| {
            if let (Some(city), Some(country)) = (city, country) {
                if let Some(point) = exact_city(city, country) {
                    return Some(point);
                }
            }
            if let Some(city) = city {
                if let Some(point) = most_populous_city_by_name(city) {
                    return Some(point);
                }
            }
            if let Some(country) = country {
                if let Some(point) = country_capital(country) {
                    return Some(point);
                }
            }
            if let Some(continent) = continent {
                if let Some(point) = continent_centroid(continent) {
                    return Some(point);
                }
            }
            None
        })();

        self.cache.insert(key, resolved);
        resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_wins_over_fallbacks() {
        let geo = Geocoder::new();
        let resolved = geo.resolve(Some("London"), Some("GB"), Some("EU")).unwrap();
        assert_eq!(resolved, LatLon { lat: 51.5074, lon: -0.1278 });
    }

    #[test]
    fn falls_back_to_most_populous_city_by_name() {
        let geo = Geocoder::new();
        // city known, country wrong/unknown -> falls through to by-name lookup
        let resolved = geo.resolve(Some("Tokyo"), Some("ZZ"), None).unwrap();
        assert_eq!(resolved, LatLon { lat: 35.6762, lon: 139.6503 });
    }

    #[test]
    fn falls_back_to_country_capital() {
        let geo = Geocoder::new();
        let resolved = geo.resolve(Some("Nowheresville"), Some("PL"), None).unwrap();
        assert_eq!(resolved, LatLon { lat: 52.2297, lon: 21.0122 });
    }

    #[test]
    fn falls_back_to_continent_centroid() {
        let geo = Geocoder::new();
        let resolved = geo.resolve(None, None, Some("OC")).unwrap();
        assert_eq!(resolved, LatLon { lat: -22.7359, lon: 140.0188 });
    }

    #[test]
    fn unresolvable_lookup_returns_none() {
        let geo = Geocoder::new();
        assert!(geo.resolve(None, None, None).is_none());
        assert!(geo.resolve(Some("Nowhere"), Some("ZZ"), None).is_none());
    }

    #[test]
    fn repeated_lookups_hit_the_cache() {
        let geo = Geocoder::new();
        let first = geo.resolve(Some("Zurich"), Some("CH"), None);
        let second = geo.resolve(Some("Zurich"), Some("CH"), None);
        assert_eq!(first, second);
    }
}
