//! Conversion between stored records and archive records.
//!
//! Foreign keys are stored as record ids but written to archives as the
//! referenced record's natural key whenever the referenced entity type has
//! one. Decoding reverses this against the destination store, so archives
//! remain valid when ids differ between stores. References to types without
//! a natural key travel as raw primary keys.

use crate::catalog::{EntityCatalog, EntityTypeDescriptor};
use crate::error::{CoreError, CoreResult};
use crate::record::{ArchiveRecord, FieldMap, NaturalKey, StoredRecord};
use crate::store::{RecordStore, StoreTransaction};
use crate::types::RecordId;
use serde_json::Value;

/// Serializes every record of an entity type for an archive.
///
/// Fails when a reference cannot be resolved to a natural key, for example
/// when the referenced record is missing.
pub fn encode_records<S: RecordStore>(
    catalog: &EntityCatalog,
    store: &S,
    descriptor: &EntityTypeDescriptor,
) -> CoreResult<Vec<ArchiveRecord>> {
    store
        .records(&descriptor.id)?
        .into_iter()
        .map(|record| encode_record(catalog, store, descriptor, record))
        .collect()
}

fn encode_record<S: RecordStore>(
    catalog: &EntityCatalog,
    store: &S,
    descriptor: &EntityTypeDescriptor,
    record: StoredRecord,
) -> CoreResult<ArchiveRecord> {
    let mut fields = FieldMap::new();
    for field in &descriptor.fields {
        let value = record.fields.get(&field.name).cloned().unwrap_or(Value::Null);
        let value = match (&field.references, &value) {
            (Some(target), Value::Number(_)) => {
                let target_descriptor = catalog.require(target)?;
                if target_descriptor.supports_natural_key() {
                    let id = value.as_u64().map(RecordId::new).ok_or_else(|| {
                        CoreError::serialization(
                            &descriptor.id,
                            format!("{} holds a malformed id {}", field.name, value),
                        )
                    })?;
                    let referenced = store.get(target, id)?.ok_or_else(|| {
                        CoreError::serialization(
                            &descriptor.id,
                            format!("{} references missing {} {}", field.name, target, id),
                        )
                    })?;
                    target_descriptor
                        .natural_key_of(&referenced.fields)
                        .ok_or_else(|| {
                            CoreError::serialization(
                                &descriptor.id,
                                format!("{} {} has no natural key", target, id),
                            )
                        })?
                        .into_value()
                } else {
                    value
                }
            }
            _ => value,
        };
        fields.insert(field.name.clone(), value);
    }

    Ok(ArchiveRecord {
        entity_type: descriptor.id.clone(),
        pk: Some(record.id),
        fields,
    })
}

/// Turns an archive record back into the id and field values to store.
///
/// The returned id is where the record should be written:
/// - for natural-key types, the existing record with the same natural key
///   (overwrite) or `None` (insert with a fresh id)
/// - otherwise the archive's primary key, which is then required
pub fn decode_record(
    catalog: &EntityCatalog,
    txn: &dyn StoreTransaction,
    descriptor: &EntityTypeDescriptor,
    record: ArchiveRecord,
) -> CoreResult<(Option<RecordId>, FieldMap)> {
    if record.entity_type != descriptor.id {
        return Err(CoreError::deserialization(format!(
            "record of type {} found in data for {}",
            record.entity_type, descriptor.id
        )));
    }

    let mut fields = FieldMap::new();
    for (name, value) in record.fields {
        let field = descriptor
            .get_field(&name)
            .ok_or_else(|| CoreError::unknown_field(&descriptor.id, name.as_str()))?;
        let value = match &field.references {
            Some(target) => resolve_reference(catalog, txn, target, value)?,
            None => value,
        };
        fields.insert(name, value);
    }

    let id = if descriptor.supports_natural_key() {
        let key = descriptor.natural_key_of(&fields).ok_or_else(|| {
            CoreError::deserialization(format!(
                "record is missing natural key fields {:?}",
                descriptor.natural_key
            ))
        })?;
        txn.find_by_natural_key(&descriptor.id, &key)?
    } else {
        Some(record.pk.ok_or_else(|| {
            CoreError::deserialization("record has neither a natural key nor a pk")
        })?)
    };

    Ok((id, fields))
}

fn resolve_reference(
    catalog: &EntityCatalog,
    txn: &dyn StoreTransaction,
    target: &crate::types::EntityTypeId,
    value: Value,
) -> CoreResult<Value> {
    if value.is_null() || value.is_u64() {
        return Ok(value);
    }

    let target_descriptor = catalog.require(target)?;
    let key = match NaturalKey::from_reference(&value) {
        Some(key) if target_descriptor.supports_natural_key() => key,
        _ => {
            return Err(CoreError::deserialization(format!(
                "invalid reference to {target}: {value}"
            )))
        }
    };

    match txn.find_by_natural_key(target, &key)? {
        Some(id) => Ok(Value::from(id.as_u64())),
        None => Err(CoreError::NaturalKeyNotFound {
            entity_type: target.clone(),
            key: key.to_string(),
        }),
    }
}
