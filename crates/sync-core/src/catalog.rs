//! Entity catalog: the static list of mirrored collections.
//!
//! The catalog is built once at startup and shared read-only (behind an
//! `Arc`) with every component that needs to enumerate entities.

use std::collections::HashMap;

/// Mapping of one source collection to its destination table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDescriptor {
    /// Source collection id (e.g. "faktura-vydana")
    pub slug: String,
    /// Destination table name (e.g. "flexibee_faktura_vydana")
    pub table: String,
    /// Primary key field, present in every record
    pub primary_key: String,
    /// Reference (master) data is exempt from retention cleanup
    pub is_reference_data: bool,
}

impl EntityDescriptor {
    pub fn new(
        slug: impl Into<String>,
        table: impl Into<String>,
        primary_key: impl Into<String>,
        is_reference_data: bool,
    ) -> Self {
        Self {
            slug: slug.into(),
            table: table.into(),
            primary_key: primary_key.into(),
            is_reference_data,
        }
    }

    /// Descriptor for a Flexibee evidence, keyed by `id` and stored in
    /// `flexibee_<slug>` with hyphens turned into underscores.
    pub fn flexibee(slug: &str, is_reference_data: bool) -> Self {
        Self::new(
            slug,
            format!("flexibee_{}", slug.replace('-', "_")),
            "id",
            is_reference_data,
        )
    }
}

/// Registry of entity descriptors, iterated in registration order.
#[derive(Debug, Clone, Default)]
pub struct EntityCatalog {
    entities: Vec<EntityDescriptor>,
    index: HashMap<String, usize>,
}

impl EntityCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entity. Registering an existing slug replaces its descriptor
    /// but keeps its original position.
    pub fn register(&mut self, entity: EntityDescriptor) {
        match self.index.get(&entity.slug) {
            Some(&pos) => self.entities[pos] = entity,
            None => {
                self.index.insert(entity.slug.clone(), self.entities.len());
                self.entities.push(entity);
            }
        }
    }

    pub fn with(mut self, entity: EntityDescriptor) -> Self {
        self.register(entity);
        self
    }

    pub fn get(&self, slug: &str) -> Option<&EntityDescriptor> {
        self.index.get(slug).map(|&pos| &self.entities[pos])
    }

    pub fn all(&self) -> &[EntityDescriptor] {
        &self.entities
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// The standard set of Flexibee evidences.
    pub fn flexibee_default() -> Self {
        // (slug, is_reference_data)
        const EVIDENCES: &[(&str, bool)] = &[
            // Sales & invoicing
            ("prodejka", false),
            ("faktura-vydana", false),
            ("faktura-prijata", false),
            ("pohledavka", false),
            ("zavazek", false),
            // Orders
            ("objednavka-prijata", false),
            ("objednavka-vydana", false),
            ("nabidka-vydana", false),
            ("nabidka-prijata", false),
            ("poptavka-vydana", false),
            ("poptavka-prijata", false),
            // Inventory
            ("sklad", true),
            ("skladovy-pohyb", false),
            ("skladova-karta", true),
            // Contacts
            ("adresar", true),
            ("kontakt", true),
            // Cash & banking
            ("banka", false),
            ("pokladni-pohyb", false),
            ("bankovni-ucet", true),
            ("pokladna", true),
            // Products
            ("cenik", true),
            ("skupina-zbozi", true),
            ("merna-jednotka", true),
            // Accounting
            ("stredisko", true),
            ("zakazka", true),
            ("cinnost", true),
            ("ucet", true),
            ("sazba-dph", true),
            ("kurz", false),
            // Contracts
            ("smlouva", false),
            ("dodavatelska-smlouva", false),
            // Assets
            ("majetek", true),
        ];

        let mut catalog = Self::new();
        for (slug, is_reference_data) in EVIDENCES {
            catalog.register(EntityDescriptor::flexibee(slug, *is_reference_data));
        }
        catalog
    }
}
