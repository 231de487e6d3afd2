//! Parameter, query and provide key constants.
//!
//! Avoid string typos, enable IDE autocomplete.
//! Usage: `node.params().get_float_or(P_AMOUNT, 0.0)`

// === Query (evaluation context) ===
/// Global time cursor in milliseconds
pub const Q_TIME: &str = "time";
/// Time elapsed since the previously cooked cursor position
pub const Q_DELTA: &str = "delta";

// === Provide/inject ===
/// Collection of the previous simulation step
pub const K_PREVIOUS_FRAME: &str = "previous_frame";

// === Generator ===
/// Grid row count
pub const P_ROWS: &str = "rows";
/// Grid column count
pub const P_COLS: &str = "cols";
/// Distance between grid cells
pub const P_SPACING: &str = "spacing";
/// Start time of generated animation
pub const P_START: &str = "start";
/// Fade-in duration of generated elements
pub const P_DURATION: &str = "duration";
/// Texture id assigned to generated elements
pub const P_SPRITE: &str = "sprite";

// === Transform ===
/// Time offset applied to every timeline
pub const P_AMOUNT: &str = "amount";
/// Query time offset
pub const P_OFFSET: &str = "offset";

// === Utility ===
/// Number of elements
pub const P_COUNT: &str = "count";
/// Keep-alive window before the cursor
pub const P_BEFORE: &str = "before";
/// Keep-alive window after the cursor
pub const P_AFTER: &str = "after";
/// Attribute column name
pub const P_ATTRIBUTE: &str = "attribute";
/// Attribute kind tag (float, int, vec2, presence)
pub const P_KIND: &str = "kind";
/// Constant value to write
pub const P_VALUE: &str = "value";

// === Assets ===
/// Texture name in the asset store
pub const P_TEXTURE: &str = "texture";

// === Script ===
/// Script source code
pub const P_SOURCE: &str = "source";

// === Containers ===
/// Container input slot read by a SubnetInput
pub const P_INDEX: &str = "index";
/// Fixed simulation step in milliseconds
pub const P_STEP: &str = "step";
