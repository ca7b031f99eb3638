use cartilla_core::{Actor, Estado};
use cartilla_storage::CartillaQuery;
use serde::{Deserialize, Serialize};
use time::Date;

use crate::error::ServiceError;
use crate::record::format_date;

pub const DEFAULT_PAGE_LIMIT: usize = 20;
pub const MAX_PAGE_LIMIT: usize = 100;

/// Listing filter. Date bounds are inclusive; `page` is 1-based.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartillaFilter {
    #[serde(default)]
    pub estado: Option<Estado>,
    #[serde(default)]
    pub fecha_desde: Option<Date>,
    #[serde(default)]
    pub fecha_hasta: Option<Date>,
    #[serde(default)]
    pub page: Option<usize>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl CartillaFilter {
    /// Effective page number: absent or 0 means the first page.
    pub fn page(&self) -> usize {
        self.page.filter(|p| *p > 0).unwrap_or(1)
    }

    /// Effective page size, clamped to `1..=MAX_PAGE_LIMIT`.
    pub fn limit(&self) -> usize {
        match self.limit {
            None | Some(0) => DEFAULT_PAGE_LIMIT,
            Some(n) => n.min(MAX_PAGE_LIMIT),
        }
    }

    /// The storage query for `actor`, with the owner scope applied.
    pub(crate) fn to_query(&self, actor: &Actor) -> Result<CartillaQuery, ServiceError> {
        let date = |d: Option<Date>| {
            d.map(format_date)
                .transpose()
                .map_err(|e| ServiceError::record("filter", e))
        };
        Ok(CartillaQuery {
            created_by: cartilla_core::owner_scope(actor).map(str::to_string),
            estado: self.estado.map(|e| e.as_str().to_string()),
            fecha_desde: date(self.fecha_desde)?,
            fecha_hasta: date(self.fecha_hasta)?,
            offset: (self.page() - 1).saturating_mul(self.limit()),
            limit: self.limit(),
        })
    }
}

/// One page of a listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub limit: usize,
    /// Matching records across all pages.
    pub total: usize,
    pub pages: usize,
}

impl<T> Page<T> {
    pub(crate) fn new(items: Vec<T>, page: usize, limit: usize, total: usize) -> Self {
        Self {
            items,
            page,
            limit,
            total,
            pages: total.div_ceil(limit),
        }
    }
}

/// Dashboard counts over the cartillas an actor can see.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EstadoStats {
    pub total: usize,
    pub borrador: usize,
    pub en_revision: usize,
    pub aprobada: usize,
    pub rechazada: usize,
}

impl EstadoStats {
    pub fn get(&self, estado: Estado) -> usize {
        match estado {
            Estado::Draft => self.borrador,
            Estado::InReview => self.en_revision,
            Estado::Approved => self.aprobada,
            Estado::Rejected => self.rechazada,
        }
    }

    pub(crate) fn set(&mut self, estado: Estado, count: usize) {
        let slot = match estado {
            Estado::Draft => &mut self.borrador,
            Estado::InReview => &mut self.en_revision,
            Estado::Approved => &mut self.aprobada,
            Estado::Rejected => &mut self.rechazada,
        };
        *slot = count;
    }
}
