use std::borrow::Cow;

use serde_json::{Value, json};
use validator::{Validate, ValidationError, ValidationErrors, ValidationErrorsKind};

use crate::game::{GamePayload, GameStatus};

/// Field rules applied to the normalized payload. Field names double as the
/// error keys on the wire, so they use the wire spelling.
#[derive(Debug, Validate)]
struct GameCandidate {
    #[validate(length(min = 2, message = "El nombre del juego debe tener al menos 2 caracteres."))]
    nombre: Option<String>,
    #[validate(length(min = 2, message = "La plataforma debe tener al menos 2 caracteres."))]
    plataforma: Option<String>,
    #[validate(range(max = 9999, message = "Las horas jugadas no pueden exceder 9999."))]
    horas_jugadas: Option<u32>,
    #[validate(range(min = 1, max = 10, message = "La calificación debe estar entre 1 y 10."))]
    calificacion: Option<i32>,
}

fn error_with_message(code: &'static str, message: &'static str) -> ValidationError {
    let mut error = ValidationError::new(code);
    error.message = Some(Cow::Borrowed(message));
    error
}

/// Normalizes the payload in place (trims name and platform) and checks every
/// rule, collecting all failures instead of stopping at the first. With
/// `require_all` set (create and PUT), name and platform must be present.
pub fn validate_payload(
    payload: &mut GamePayload,
    require_all: bool,
) -> Result<(), ValidationErrors> {
    payload.name = payload.name.take().map(|s| s.trim().to_string());
    payload.platform = payload.platform.take().map(|s| s.trim().to_string());

    let candidate = GameCandidate {
        nombre: payload.name.clone(),
        plataforma: payload.platform.clone(),
        horas_jugadas: payload.hours_played,
        calificacion: payload.rating.flatten(),
    };

    let mut errors = match candidate.validate() {
        Ok(()) => ValidationErrors::new(),
        Err(errors) => errors,
    };

    if require_all {
        if payload.name.is_none() {
            errors.add(
                "nombre".into(),
                error_with_message("required", "This field is required."),
            );
        }
        if payload.platform.is_none() {
            errors.add(
                "plataforma".into(),
                error_with_message("required", "This field is required."),
            );
        }
    }

    // Object-level rule: the payload's own hours count, defaulting to zero.
    if payload.status == Some(GameStatus::Completed) && payload.hours_played.unwrap_or(0) == 0 {
        errors.add(
            "non_field_errors".into(),
            error_with_message(
                "completed_without_hours",
                "Un juego completado debe tener al menos 1 hora jugada.",
            ),
        );
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

/// Serializes collected errors as a `field -> [messages]` map, the shape the
/// original REST clients expect (object-level under `non_field_errors`).
pub fn validation_detail(errors: &ValidationErrors) -> Value {
    let mut detail = serde_json::Map::new();
    for (field, kind) in errors.errors() {
        if let ValidationErrorsKind::Field(field_errors) = kind {
            let messages: Vec<Value> = field_errors
                .iter()
                .map(|e| {
                    json!(
                        e.message
                            .as_ref()
                            .map(|m| m.to_string())
                            .unwrap_or_else(|| e.code.to_string())
                    )
                })
                .collect();
            let field: &str = field.as_ref();
            detail.insert(field.to_string(), Value::Array(messages));
        }
    }
    Value::Object(detail)
}
