//! MUX_CABLE_INFO / MUX_CABLE_STATIC_INFO rows.

use sonic_xcvr_common::tables::fields;
use sonic_xcvr_common::{Capability, DiagDict, FieldValue, Result, Table, YCablePort};

/// Field values of a telemetry dictionary, stamped with `now`.
/// `None` for an empty or unimplemented read.
pub fn telemetry_row(read: Capability<DiagDict>, now: i64) -> Option<Vec<FieldValue>> {
    let dict = read.value().filter(|d| !d.is_empty())?;
    let mut fvs: Vec<FieldValue> = dict
        .into_iter()
        .map(|(field, value)| (field, value.to_string()))
        .collect();
    fvs.push((fields::LAST_UPDATE_TIME.to_string(), now.to_string()));
    Some(fvs)
}

/// Writes the cable's static information. Returns whether a row was written.
pub async fn publish_static_info(
    table: &Table,
    logical: &str,
    ycable: &dyn YCablePort,
    now: i64,
) -> Result<bool> {
    match telemetry_row(ycable.get_static_info(), now) {
        Some(fvs) => table.set(logical, &fvs).await.map(|_| true),
        None => Ok(false),
    }
}

/// Writes the cable's live telemetry. Returns whether a row was written.
pub async fn publish_info(
    table: &Table,
    logical: &str,
    ycable: &dyn YCablePort,
    now: i64,
) -> Result<bool> {
    match telemetry_row(ycable.get_telemetry(), now) {
        Some(fvs) => table.set(logical, &fvs).await.map(|_| true),
        None => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sonic_xcvr_common::diag_dict;

    #[test]
    fn test_telemetry_row() {
        let row = telemetry_row(
            Capability::Value(diag_dict! { "vendor" => "Credo", "link_up" => true, "temp" => 41.5 }),
            7,
        )
        .unwrap();
        assert_eq!(
            row,
            vec![
                ("link_up".to_string(), "True".to_string()),
                ("temp".to_string(), "41.5".to_string()),
                ("vendor".to_string(), "Credo".to_string()),
                ("last_update_time".to_string(), "7".to_string()),
            ]
        );
    }

    #[test]
    fn test_telemetry_row_empty() {
        assert!(telemetry_row(Capability::Value(DiagDict::new()), 7).is_none());
        assert!(telemetry_row(Capability::NotImplemented, 7).is_none());
    }
}
