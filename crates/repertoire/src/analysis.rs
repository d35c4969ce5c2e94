/// Deviation scoring — pure functions only
/// (No Board/Cache/Engine dependencies)

/// Loss thresholds (centipawns lost by the deviating move)
const THRESHOLD_GOOD: i32 = 50;
const THRESHOLD_INACCURACY: i32 = 100;
const THRESHOLD_MISTAKE: i32 = 200;

/// Centipawns lost by a move, both scores from the mover's point of view.
///
/// Negative when the move scored better than the static pre-move eval.
pub fn eval_loss(before_cp: i32, after_cp: i32) -> i32 {
    before_cp - after_cp
}

/// Label for a deviation's loss in coaching output.
pub fn classify_loss(loss_cp: i32) -> &'static str {
    if loss_cp <= 0 {
        "improvement"
    } else if loss_cp < THRESHOLD_GOOD {
        "good"
    } else if loss_cp < THRESHOLD_INACCURACY {
        "inaccuracy"
    } else if loss_cp < THRESHOLD_MISTAKE {
        "mistake"
    } else {
        "blunder"
    }
}

/// Round to one decimal place, halves to even (0.25 becomes 0.2).
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round_ties_even() / 10.0
}
