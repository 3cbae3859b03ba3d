//! User-facing message catalog.

use crate::config::Locale;
use crate::outcome::{FailureReason, Side};

/// Side-qualified rejection message, e.g.
/// "Error en la validación de la imagen frontal: La imagen está borrosa."
pub fn rejection(locale: Locale, side: Side, reason: FailureReason) -> String {
    let detail = reason_text(locale, reason);
    match (locale, side) {
        (_, Side::Face) => detail.to_string(),
        (Locale::Es, Side::Front) => {
            format!("Error en la validación de la imagen frontal: {detail}")
        }
        (Locale::Es, Side::Back) => {
            format!("Error en la validación de la imagen trasera: {detail}")
        }
        (Locale::En, Side::Front) => format!("Front image validation failed: {detail}"),
        (Locale::En, Side::Back) => format!("Back image validation failed: {detail}"),
    }
}

fn reason_text(locale: Locale, reason: FailureReason) -> &'static str {
    use FailureReason::*;
    match locale {
        Locale::Es => match reason {
            LowResolution => "La resolución de la imagen es demasiado baja.",
            BlurryImage => "La imagen está borrosa.",
            CroppedImage => "La imagen está cortada o incompleta.",
            WrongOrientation => "La imagen no tiene la orientación correcta.",
            NoTextDetected => "No se detectó texto en la imagen.",
            NoFaceDetected => "No se detectó un rostro en la imagen.",
            NoFingerprintDetected => "No se detectó la huella dactilar.",
            FaceMismatch { .. } => "El rostro no coincide con la imagen de la cédula",
            Timeout => "La verificación excedió el tiempo máximo permitido.",
        },
        Locale::En => match reason {
            LowResolution => "The image resolution is too low.",
            BlurryImage => "The image is blurry.",
            CroppedImage => "The image is cropped or incomplete.",
            WrongOrientation => "The image is not correctly oriented.",
            NoTextDetected => "No text was detected in the image.",
            NoFaceDetected => "No face was detected in the image.",
            NoFingerprintDetected => "No fingerprint was detected.",
            FaceMismatch { .. } => "The face does not match the ID card photo",
            Timeout => "Verification exceeded the maximum allowed time.",
        },
    }
}

pub fn success(locale: Locale) -> &'static str {
    match locale {
        Locale::Es => "Imágenes validadas exitosamente",
        Locale::En => "Images validated successfully",
    }
}

pub fn unreadable_image(locale: Locale) -> &'static str {
    match locale {
        Locale::Es => "No se pudo leer una de las imágenes. Envíe archivos JPEG o PNG válidos.",
        Locale::En => "One of the images could not be read. Please submit valid JPEG or PNG files.",
    }
}

pub fn unavailable(locale: Locale) -> &'static str {
    match locale {
        Locale::Es => {
            "La verificación no está disponible en este momento. Intente nuevamente más tarde."
        }
        Locale::En => "Verification is unavailable right now. Please try again later.",
    }
}
