//! Mapping between [`Cartilla`] and the storage [`CartillaRecord`].
//!
//! The full record travels as its JSON document; the indexed columns are
//! copied out of it so backends can filter without decoding.

use cartilla_core::Cartilla;
use cartilla_storage::CartillaRecord;
use time::macros::format_description;
use time::{Date, OffsetDateTime, UtcOffset};

use crate::error::ServiceError;

/// Fixed-width UTC RFC 3339, so stored timestamps sort as strings.
pub(crate) fn format_timestamp(at: OffsetDateTime) -> Result<String, String> {
    at.to_offset(UtcOffset::UTC)
        .format(format_description!(
            "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:6]Z"
        ))
        .map_err(|e| e.to_string())
}

pub(crate) fn format_date(date: Date) -> Result<String, String> {
    date.format(format_description!("[year]-[month]-[day]"))
        .map_err(|e| e.to_string())
}

pub(crate) fn encode(cartilla: &Cartilla, version: i64) -> Result<CartillaRecord, ServiceError> {
    let err = |reason: String| ServiceError::record(&cartilla.id, reason);
    let document = serde_json::to_value(cartilla).map_err(|e| err(e.to_string()))?;
    Ok(CartillaRecord {
        id: cartilla.id.clone(),
        uom_numero: cartilla.uom_numero().to_string(),
        estado: cartilla.estado().as_str().to_string(),
        created_by: cartilla.created_by().to_string(),
        fecha_prueba: format_date(cartilla.content().fecha_prueba).map_err(err)?,
        version,
        created_at: format_timestamp(cartilla.created_at()).map_err(err)?,
        updated_at: format_timestamp(cartilla.updated_at()).map_err(err)?,
        document,
    })
}

pub(crate) fn decode(record: &CartillaRecord) -> Result<Cartilla, ServiceError> {
    serde_json::from_value(record.document.clone())
        .map_err(|e| ServiceError::record(&record.id, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cartilla_core::{
        Actor, CartillaDraft, Estado, Instalacion, LeakTestInput, PressureTable, ResultadoPrueba,
    };
    use time::macros::{date, datetime};

    fn sample() -> Cartilla {
        let mut draft = CartillaDraft::new(
            "UOM-12",
            Instalacion {
                rut: "76.000.000-0".to_string(),
                nombre_sitio: "Copec Ruta 5".to_string(),
                ..Default::default()
            },
            date!(2024 - 07 - 09),
            "M. Soto",
        );
        draft.pruebas.push(LeakTestInput::new(
            "1",
            "T1",
            Some(30.5),
            ResultadoPrueba::Pasa,
        ));
        let content = draft.measure(&PressureTable::default()).unwrap();
        Cartilla::new_draft(
            "c-12",
            content,
            &Actor::operador("op-1"),
            datetime!(2024-07-09 14:03:07.25 -04:00),
        )
    }

    #[test]
    fn encode_copies_indexed_columns() {
        let record = encode(&sample(), 4).unwrap();
        assert_eq!(record.id, "c-12");
        assert_eq!(record.uom_numero, "UOM-12");
        assert_eq!(record.estado, "BORRADOR");
        assert_eq!(record.created_by, "op-1");
        assert_eq!(record.fecha_prueba, "2024-07-09");
        assert_eq!(record.version, 4);
        assert_eq!(record.created_at, "2024-07-09T18:03:07.250000Z");
        assert_eq!(record.document["uomNumero"], "UOM-12");
        assert_eq!(record.document["estado"], "BORRADOR");
        assert_eq!(record.document["pruebas"][0]["flujoFugaGPH"], 5.3);
    }

    #[test]
    fn decode_restores_the_record() {
        let cartilla = sample();
        let back = decode(&encode(&cartilla, 0).unwrap()).unwrap();
        assert_eq!(back, cartilla);
        assert_eq!(back.estado(), Estado::Draft);
    }

    #[test]
    fn timestamps_sort_as_strings() {
        let earlier = format_timestamp(datetime!(2024-01-01 10:00:00 UTC)).unwrap();
        let later = format_timestamp(datetime!(2024-01-01 10:00:00.5 UTC)).unwrap();
        assert!(earlier < later);
    }

    #[test]
    fn unreadable_document_is_a_record_error() {
        let mut record = encode(&sample(), 0).unwrap();
        record.document = serde_json::json!({"id": "c-12"});
        assert!(matches!(
            decode(&record),
            Err(ServiceError::Record { ref id, .. }) if id == "c-12"
        ));
    }
}
