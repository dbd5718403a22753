use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use thiserror::Error;

/// Category assigned to free-text services that match nothing in the catalog
pub const CUSTOM_CATEGORY: &str = "Custom";

/// Errors that can occur while building a catalog
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Duplicate service name: {0}")]
    DuplicateName(String),

    #[error("Service entry with empty name in category {0:?}")]
    EmptyName(String),

    #[error("Failed to read catalog file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid catalog file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// A canonical service with its category and search synonyms
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEntry {
    pub name: String,
    pub category: String,
    #[serde(default)]
    pub synonyms: BTreeSet<String>,
}

impl ServiceEntry {
    pub fn new(name: &str, category: &str, synonyms: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            category: category.to_string(),
            synonyms: synonyms.iter().map(|s| s.to_lowercase()).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(rename = "service", default)]
    services: Vec<ServiceEntry>,
}

/// Read-only catalog of canonical services
///
/// Entry order is significant: matcher passes report results in catalog order.
#[derive(Debug, Clone)]
pub struct ServiceCatalog {
    entries: Vec<ServiceEntry>,
    by_name: HashMap<String, usize>,
}

impl ServiceCatalog {
    pub fn new(entries: Vec<ServiceEntry>) -> Result<Self, CatalogError> {
        let mut by_name = HashMap::with_capacity(entries.len());
        let mut normalized = Vec::with_capacity(entries.len());

        for mut entry in entries {
            entry.name = entry.name.trim().to_string();
            if entry.name.is_empty() {
                return Err(CatalogError::EmptyName(entry.category));
            }
            entry.synonyms = entry
                .synonyms
                .iter()
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect();

            let key = entry.name.to_lowercase();
            if by_name.insert(key, normalized.len()).is_some() {
                return Err(CatalogError::DuplicateName(entry.name));
            }
            normalized.push(entry);
        }

        Ok(Self {
            entries: normalized,
            by_name,
        })
    }

    /// Parse a catalog from TOML:
    ///
    /// ```toml
    /// [[service]]
    /// name = "Electrician"
    /// category = "Home Repair"
    /// synonyms = ["wiring", "electrical"]
    /// ```
    pub fn from_toml_str(source: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = toml::from_str(source)?;
        Self::new(file.services)
    }

    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self, CatalogError> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    /// The catalog shipped with the app
    pub fn builtin() -> Self {
        let entries = vec![
            ServiceEntry::new("Electrician", "Home Repair", &["wiring", "electrical", "power outage", "sockets", "lighting installation"]),
            ServiceEntry::new("Plumber", "Home Repair", &["plumbing", "leak", "pipes", "drain", "water heater"]),
            ServiceEntry::new("Carpenter", "Home Repair", &["woodwork", "furniture repair", "cabinets", "doors"]),
            ServiceEntry::new("Painter", "Home Repair", &["painting", "wall paint", "decorating", "wallpaper"]),
            ServiceEntry::new("Mason", "Home Repair", &["bricklaying", "tiling", "concrete", "plastering"]),
            ServiceEntry::new("Welder", "Home Repair", &["welding", "metal work", "gates", "burglar proof"]),
            ServiceEntry::new("Roofer", "Home Repair", &["roofing", "roof leak", "gutters"]),
            ServiceEntry::new("AC Technician", "Appliances", &["air conditioner", "hvac", "cooling", "ac repair"]),
            ServiceEntry::new("Generator Repair", "Appliances", &["generator", "gen set", "inverter"]),
            ServiceEntry::new("Appliance Repair", "Appliances", &["fridge", "washing machine", "microwave", "freezer"]),
            ServiceEntry::new("Solar Installer", "Appliances", &["solar panels", "solar power", "inverter installation"]),
            ServiceEntry::new("House Cleaner", "Cleaning", &["cleaning", "maid", "housekeeping", "deep clean"]),
            ServiceEntry::new("Laundry Service", "Cleaning", &["laundry", "dry cleaning", "ironing"]),
            ServiceEntry::new("Fumigation", "Cleaning", &["pest control", "fumigator", "termites", "cockroaches"]),
            ServiceEntry::new("Hair Stylist", "Beauty", &["hairdresser", "braiding", "salon", "wig installation"]),
            ServiceEntry::new("Barber", "Beauty", &["haircut", "barbing", "shave"]),
            ServiceEntry::new("Makeup Artist", "Beauty", &["makeup", "mua", "bridal makeup"]),
            ServiceEntry::new("Nail Technician", "Beauty", &["manicure", "pedicure", "nails"]),
            ServiceEntry::new("Tailor", "Fashion", &["sewing", "fashion designer", "alterations", "seamstress"]),
            ServiceEntry::new("Shoe Maker", "Fashion", &["cobbler", "shoe repair"]),
            ServiceEntry::new("Mechanic", "Automotive", &["car repair", "auto repair", "vehicle service", "engine"]),
            ServiceEntry::new("Car Wash", "Automotive", &["car cleaning", "detailing"]),
            ServiceEntry::new("Vulcanizer", "Automotive", &["tyre repair", "tire repair", "flat tyre"]),
            ServiceEntry::new("Photographer", "Events", &["photography", "photo shoot", "pictures"]),
            ServiceEntry::new("Videographer", "Events", &["video coverage", "filming", "videography"]),
            ServiceEntry::new("Caterer", "Events", &["catering", "small chops", "food service", "cook"]),
            ServiceEntry::new("Event Decorator", "Events", &["decoration", "event planning", "balloons"]),
            ServiceEntry::new("DJ", "Events", &["disc jockey", "music", "sound system"]),
            ServiceEntry::new("Private Tutor", "Education", &["tutoring", "lessons", "home teacher", "exam prep"]),
            ServiceEntry::new("Music Teacher", "Education", &["piano lessons", "guitar lessons", "music lessons"]),
            ServiceEntry::new("Phone Repair", "Technology", &["screen replacement", "phone screen", "smartphone"]),
            ServiceEntry::new("Computer Repair", "Technology", &["laptop repair", "pc repair", "it support"]),
            ServiceEntry::new("CCTV Installer", "Technology", &["security cameras", "cctv", "surveillance"]),
            ServiceEntry::new("Movers", "Logistics", &["moving", "relocation", "packing"]),
            ServiceEntry::new("Dispatch Rider", "Logistics", &["delivery", "courier", "errands"]),
        ];

        match Self::new(entries) {
            Ok(catalog) => catalog,
            Err(e) => unreachable!("built-in catalog is invalid: {}", e),
        }
    }

    /// Entries in catalog order
    pub fn entries(&self) -> &[ServiceEntry] {
        &self.entries
    }

    pub fn all_names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    /// Distinct categories in first-seen order
    pub fn all_categories(&self) -> Vec<&str> {
        let mut categories: Vec<&str> = Vec::new();
        for entry in &self.entries {
            if !categories.contains(&entry.category.as_str()) {
                categories.push(&entry.category);
            }
        }
        categories
    }

    pub fn entries_in<'a>(&'a self, category: &'a str) -> impl Iterator<Item = &'a ServiceEntry> + 'a {
        self.entries
            .iter()
            .filter(move |e| e.category.eq_ignore_ascii_case(category))
    }

    /// Case-insensitive lookup by canonical name
    pub fn lookup(&self, name: &str) -> Option<&ServiceEntry> {
        self.by_name
            .get(&name.trim().to_lowercase())
            .map(|&idx| &self.entries[idx])
    }

    pub fn synonyms_of(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.lookup(name).map(|e| &e.synonyms)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ServiceCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_lookup() {
        let catalog = ServiceCatalog::builtin();

        let entry = catalog.lookup("electrician").unwrap();
        assert_eq!(entry.name, "Electrician");
        assert!(catalog.synonyms_of("Electrician").unwrap().contains("wiring"));
        assert!(catalog.lookup("Astronaut").is_none());
    }

    #[test]
    fn test_categories_are_distinct() {
        let catalog = ServiceCatalog::builtin();
        let categories = catalog.all_categories();

        let unique: BTreeSet<_> = categories.iter().collect();
        assert_eq!(unique.len(), categories.len());
        assert_eq!(categories[0], "Home Repair");
        assert!(catalog.entries_in("beauty").any(|e| e.name == "Barber"));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let result = ServiceCatalog::new(vec![
            ServiceEntry::new("Plumber", "Home Repair", &[]),
            ServiceEntry::new("plumber", "Other", &[]),
        ]);
        assert!(matches!(result, Err(CatalogError::DuplicateName(_))));
    }

    #[test]
    fn test_from_toml() {
        let catalog = ServiceCatalog::from_toml_str(
            r#"
            [[service]]
            name = "Electrician"
            category = "Home Repair"
            synonyms = ["Wiring", "electrical"]

            [[service]]
            name = "Gardener"
            category = "Outdoor"
            "#,
        )
        .unwrap();

        assert_eq!(catalog.len(), 2);
        assert!(catalog.synonyms_of("electrician").unwrap().contains("wiring"));
        assert!(catalog.synonyms_of("Gardener").unwrap().is_empty());
    }
}
