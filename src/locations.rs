/// Location registry for the Oregon AQI forecasting service.
///
/// The canonical list of locations the `seed` command inserts into the
/// `locations` table. Database ids are assigned on insert; everything
/// downstream refers to locations by those ids, never by name.

// ---------------------------------------------------------------------------
// Seed metadata
// ---------------------------------------------------------------------------

/// A location to seed, before the database has given it an id.
#[derive(Debug, Clone, PartialEq)]
pub struct SeedLocation {
    /// Display name. Unique in the `locations` table.
    pub name: &'static str,
    /// WGS84 latitude.
    pub latitude: f64,
    /// WGS84 longitude.
    pub longitude: f64,
}

/// Default monitored locations, city centers of the Willamette Valley and
/// southern/central Oregon. Coordinates are used as the AirNow lat/long query
/// point; nearby reporting areas within the ingest radius are merged.
pub static LOCATION_REGISTRY: &[SeedLocation] = &[
    SeedLocation {
        name: "Portland, OR",
        latitude: 45.5152,
        longitude: -122.6784,
    },
    SeedLocation {
        name: "Salem, OR",
        latitude: 44.9429,
        longitude: -123.0351,
    },
    SeedLocation {
        name: "Eugene, OR",
        latitude: 44.0521,
        longitude: -123.0868,
    },
    SeedLocation {
        name: "Medford, OR",
        latitude: 42.3265,
        longitude: -122.8756,
    },
    SeedLocation {
        name: "Bend, OR",
        latitude: 44.0582,
        longitude: -121.3153,
    },
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_all_locations_are_in_oregon_bounding_box() {
        for loc in LOCATION_REGISTRY {
            assert!((41.9..=46.3).contains(&loc.latitude), "{} latitude", loc.name);
            assert!((-124.7..=-116.4).contains(&loc.longitude), "{} longitude", loc.name);
        }
    }

    #[test]
    fn test_no_duplicate_names() {
        let mut seen = HashSet::new();
        for loc in LOCATION_REGISTRY {
            assert!(seen.insert(loc.name), "duplicate location name: {}", loc.name);
        }
    }

    #[test]
    fn test_names_carry_the_state_suffix() {
        for loc in LOCATION_REGISTRY {
            assert!(loc.name.ends_with(", OR"), "{} is missing ', OR'", loc.name);
        }
    }
}
