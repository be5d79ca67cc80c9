//! # Layout
//!
//! Compiles a template and its [`Resolution`] into a backend-neutral [`Plan`].
//!
//! ```text
//! ┌──────────┐     ┌────────────┐     ┌──────────┐     ┌────────────────┐
//! │ Template │ ──► │ Resolution │ ──► │   Plan   │ ──► │ preview (PNG)  │
//! │ (fields) │     │  (values)  │     │(Vec<Op>) │ ──► │ export (PDF)   │
//! └──────────┘     └────────────┘     └──────────┘     └────────────────┘
//! ```
//!
//! All geometry is in page points with a top-left origin. Field coordinates
//! are converted from designer pixels with [`Scale::designer`].
//!
//! - Empty values emit nothing; checkboxes always draw their box and are
//!   ticked by `true` or a non-zero number.
//! - Tables draw a header row and `rows` equal-height data rows; cell text is
//!   inset by [`CELL_INSET`].
//! - Group sub-fields use their own coordinates when set, otherwise they are
//!   stacked in equal-height bands inside the group box.
//! - Textarea and list values wrap to the field width; other text is one line,
//!   vertically centered.

mod geometry;
mod ops;

pub use geometry::*;
pub use ops::*;

use crate::resolve::{Resolution, ResolvedValue};
use crate::template::{Field, FieldType, Template, cell_key, group_key};

/// Color for error codes such as `#CIRC!`.
const ERROR_COLOR: [u8; 3] = [200, 0, 0];

/// Stroke width of table and checkbox outlines, in points.
const RULE_WIDTH: f32 = 0.5;

/// Build the draw plan for every page of `template`.
pub fn compile(template: &Template, resolution: &Resolution) -> Plan {
    let page_count = template.page_count();
    let pages = (1..=page_count).map(|p| template.page_size(p)).collect();
    let mut plan = Plan::new(pages);
    let scale = Scale::designer(template.scale);

    for field in &template.fields {
        // Data-only fields and fields outside the page range are never drawn.
        let Some(coords) = &field.coordinates else {
            continue;
        };
        if field.page == 0 || field.page > page_count {
            continue;
        }
        let rect = scale.coordinates(coords);

        match field.field_type {
            FieldType::Table => table(&mut plan, field, rect, resolution),
            FieldType::Group => group(&mut plan, field, rect, scale, resolution),
            _ => draw_value(&mut plan, field, field.page, rect, resolution.value(&field.id)),
        }
    }

    plan
}

/// Draw one scalar field value into `rect`.
fn draw_value(plan: &mut Plan, field: &Field, page: u32, rect: Rect, value: Option<&ResolvedValue>) {
    static EMPTY: ResolvedValue = ResolvedValue::Empty;
    let style = TextStyle::from(&field.style);
    let value = value.unwrap_or(&EMPTY);

    match (field.field_type, value) {
        (FieldType::Checkbox, v) => plan.push(Op::Checkbox {
            page,
            rect: rect.square(),
            checked: is_checked(v),
            color: style.color,
        }),
        (_, ResolvedValue::Empty) => {}
        (_, ResolvedValue::Image(data)) => plan.push(Op::Image {
            page,
            rect,
            data: data.clone(),
        }),
        (_, ResolvedValue::List(items)) => {
            let lines = items
                .iter()
                .flat_map(|item| wrap_text(&format!("- {item}"), rect.width, style.size))
                .collect();
            text(plan, page, rect, lines, style, true);
        }
        (field_type, v) => {
            let shown = v.display(field.style.decimals);
            let style = match v {
                ResolvedValue::Error(_) => style.with_color(ERROR_COLOR),
                _ => style,
            };
            if field_type.is_multiline() {
                let lines = wrap_text(&shown, rect.width, style.size);
                text(plan, page, rect, lines, style, true);
            } else {
                text(plan, page, rect, vec![shown], style, false);
            }
        }
    }
}

/// Booleans and non-zero numbers tick a checkbox.
fn is_checked(value: &ResolvedValue) -> bool {
    match value {
        ResolvedValue::Bool(b) => *b,
        ResolvedValue::Number(n) => *n != 0.0,
        _ => false,
    }
}

fn text(plan: &mut Plan, page: u32, rect: Rect, lines: Vec<String>, style: TextStyle, top: bool) {
    if lines.iter().all(|l| l.is_empty()) {
        return;
    }
    let rect = if top {
        rect
    } else {
        rect.center_band(style.line_height())
    };
    plan.push(Op::Text {
        page,
        rect,
        lines,
        style,
    });
}

fn table(plan: &mut Plan, field: &Field, rect: Rect, resolution: &Resolution) {
    let Some(config) = field.table() else {
        return;
    };
    let page = field.page;
    let style = TextStyle::from(&field.style);
    let color = style.color;

    plan.push(Op::Stroke {
        page,
        rect,
        color,
        width: RULE_WIDTH,
    });

    let bands = row_bands(rect, config.rows);
    let weights: Vec<Option<f32>> = config.columns.iter().map(|c| c.width).collect();
    let spans = column_spans(rect, &weights);

    for band in bands.iter().skip(1) {
        plan.push(Op::Line {
            page,
            from: (rect.x, band.y),
            to: (rect.right(), band.y),
            color,
            width: RULE_WIDTH,
        });
    }
    for (x, _) in spans.iter().skip(1) {
        plan.push(Op::Line {
            page,
            from: (*x, rect.y),
            to: (*x, rect.bottom()),
            color,
            width: RULE_WIDTH,
        });
    }

    for (band_index, band) in bands.iter().enumerate() {
        for (column, (x, width)) in config.columns.iter().zip(&spans) {
            let cell = Rect::new(*x, band.y, *width, band.height).inset(CELL_INSET);

            if band_index == 0 {
                let label = if column.label.is_empty() {
                    column.id.clone()
                } else {
                    column.label.clone()
                };
                text(plan, page, cell, vec![label], style.clone().bold(), false);
                continue;
            }

            let key = cell_key(&field.id, band_index - 1, &column.id);
            let mut cell_field = Field::new(key.clone(), column.column_type);
            cell_field.style = field.style.clone();
            draw_value(plan, &cell_field, page, cell, resolution.value(&key));
        }
    }
}

fn group(plan: &mut Plan, field: &Field, rect: Rect, scale: Scale, resolution: &Resolution) {
    let Some(config) = field.group() else {
        return;
    };
    let subs: Vec<&Field> = config.all_fields().collect();
    let bands = equal_bands(rect, subs.len());

    for (sub, band) in subs.into_iter().zip(bands) {
        let sub_rect = sub
            .coordinates
            .as_ref()
            .map(|c| scale.coordinates(c))
            .unwrap_or(band);
        let key = group_key(&field.id, &sub.id);
        draw_value(plan, sub, field.page, sub_rect, resolution.value(&key));
    }
}
