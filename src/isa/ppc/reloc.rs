//! PPC relocation selection and branch-prediction bit encoding.
//!
//! Mirrors `cctools`'s `as/ppc.c`'s
//! handling of `HI16`/`LO16`/`HA16`/`BR14`/`BR24`/`JBSR` and the BO-field
//! "branch always" detection used to decide whether a Y-bit flip is even
//! meaningful.

use crate::ir::fixup::RelocKind;

/// `-static_branch_prediction_Y_bit` vs `_AT_bits`: which encoding scheme
/// prediction hints use. Selected once at startup from the CLI.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PredictionScheme {
    YBit,
    AtBits,
}

/// BO-field values that encode an unconditional ("branch always") branch;
/// a prediction hint on one of these is meaningless and is rejected as a
/// warning rather than silently encoded (mirrors the original's
/// `reserved BO field` gating).
pub fn bo_is_branch_always(bo: u8) -> bool {
    matches!(bo, 0b10100 | 0b10101 | 0b10110 | 0b10111 | 0b11000..=0b11111)
}

/// Conditional-branch BO field with a prediction hint folded in.
///
/// - Y-bit scheme: bit 0 of the 5-bit BO field (the "hint" bit, BO[4] in IBM
///   numbering) is set to predict *not taken* and cleared to predict taken,
///   with the sense of `predict_taken` literally flipped depending on
///   whether the branch is backward (loop-closing branches predict taken by
///   default) — simplified here to "caller decides taken/not-taken", since
///   that directionality judgement is made by the branch-target expression
///   evaluator, not this bit-packing helper.
/// - AT-bits scheme: two bits (`AT[0..1]`) encode {no hint, reserved,
///   predict not-taken, predict taken}.
pub fn encode_bo_with_hint(bo: u8, predict_taken: Option<bool>, scheme: PredictionScheme) -> u8 {
    let Some(taken) = predict_taken else {
        return bo;
    };
    match scheme {
        PredictionScheme::YBit => {
            if taken {
                bo | 0b0000_0001
            } else {
                bo & !0b0000_0001
            }
        }
        PredictionScheme::AtBits => {
            let at = if taken { 0b11 } else { 0b10 };
            (bo & !0b0000_0011) | at
        }
    }
}

/// Pick the relocation kind for a 16-bit split immediate operand.
pub fn split16_reloc(is_ha: bool, is_lo: bool) -> RelocKind {
    if is_ha {
        RelocKind::Ha16
    } else if is_lo {
        RelocKind::Lo16
    } else {
        RelocKind::Hi16
    }
}

/// Pick the relocation kind for a branch displacement.
///
/// `is_conditional` selects the 14-bit (`BR14`) vs 24-bit (`BR24`) field
/// width; `predicted` additionally distinguishes `BR14` from
/// `BR14_predicted` so the linker/layout pass knows a Y-bit/AT-bits flip may
/// still need to happen after final layout (e.g. once the branch direction
/// is known).
pub fn branch_reloc(is_conditional: bool, predicted: bool, is_jbsr: bool) -> RelocKind {
    if is_jbsr {
        RelocKind::Jbsr
    } else if is_conditional {
        if predicted {
            RelocKind::Br14Predicted
        } else {
            RelocKind::Br14
        }
    } else {
        RelocKind::Br24
    }
}
