//! Reserialization of canonical elements into source text

use std::collections::BTreeMap;
use std::fmt::Write;

use cairn_core::{Element, Field, InstanceElement, ObjectType, PathIndex, PrimitiveType, SourcePath, TypeRef, Value, Values};

use crate::lexer::{is_word_char, is_word_start};

/// Extension of source files written by [`dump_elements`].
pub const SOURCE_EXTENSION: &str = "nacl";

const INDENT: &str = "  ";

fn indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str(INDENT);
    }
}

fn write_key(out: &mut String, key: &str) {
    let mut chars = key.chars();
    let bare = chars.next().is_some_and(is_word_start) && chars.all(is_word_char);
    if bare {
        out.push_str(key);
    } else {
        write_str(out, key);
    }
}

fn write_str(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out.push('"');
}

fn write_value(out: &mut String, value: &Value, depth: usize) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => {
            let _ = write!(out, "{}", n);
        }
        Value::String(s) => write_str(out, s),
        Value::Array(items) if items.is_empty() => out.push_str("[]"),
        Value::Array(items) => {
            out.push_str("[\n");
            for item in items {
                indent(out, depth + 1);
                write_value(out, item, depth + 1);
                out.push_str(",\n");
            }
            indent(out, depth);
            out.push(']');
        }
        Value::Object(map) if map.is_empty() => out.push_str("{}"),
        Value::Object(map) => {
            out.push_str("{\n");
            for (key, item) in map {
                write_assignment(out, key, item, depth + 1);
            }
            indent(out, depth);
            out.push('}');
        }
    }
}

fn write_assignment(out: &mut String, key: &str, value: &Value, depth: usize) {
    indent(out, depth);
    write_key(out, key);
    out.push_str(" = ");
    write_value(out, value, depth);
    out.push('\n');
}

/// `<head> { <assignments> }`, or `<head> {}` when there is nothing inside.
fn write_block(out: &mut String, head: &str, values: &Values, depth: usize) {
    indent(out, depth);
    out.push_str(head);
    if values.is_empty() {
        out.push_str(" {}\n");
        return;
    }
    out.push_str(" {\n");
    for (key, value) in values {
        write_assignment(out, key, value, depth + 1);
    }
    indent(out, depth);
    out.push_str("}\n");
}

fn write_annotation_types(out: &mut String, types: &BTreeMap<String, TypeRef>, depth: usize) {
    if types.is_empty() {
        return;
    }
    indent(out, depth);
    out.push_str("annotations {\n");
    for (name, type_ref) in types {
        indent(out, depth + 1);
        let _ = writeln!(out, "{} {}", type_ref.id().qualified_name(), name);
    }
    indent(out, depth);
    out.push_str("}\n");
}

/// Field names that are not bare words are quoted.
fn write_field(out: &mut String, field: &Field, depth: usize) {
    let mut head = format!("{} ", field.type_ref.id().qualified_name());
    write_key(&mut head, &field.name);
    write_block(out, &head, &field.annotations, depth);
}

fn render_primitive(ty: &PrimitiveType) -> String {
    let mut out = format!(
        "type {} is {}",
        ty.elem_id.qualified_name(),
        ty.primitive.keyword()
    );
    if ty.annotations.is_empty() && ty.annotation_types.is_empty() {
        out.push_str(" {}\n");
        return out;
    }
    out.push_str(" {\n");
    for (key, value) in &ty.annotations {
        write_assignment(&mut out, key, value, 1);
    }
    write_annotation_types(&mut out, &ty.annotation_types, 1);
    out.push_str("}\n");
    out
}

fn render_object(object: &ObjectType) -> String {
    let mut out = format!("model {} {{\n", object.elem_id.qualified_name());
    for (key, value) in &object.annotations {
        write_assignment(&mut out, key, value, 1);
    }
    write_annotation_types(&mut out, &object.annotation_types, 1);
    for field in object.fields.values() {
        write_field(&mut out, field, 1);
    }
    for (name, values) in &object.field_overrides {
        let mut head = String::new();
        write_key(&mut head, name);
        write_block(&mut out, &head, values, 1);
    }
    out.push_str("}\n");
    out
}

fn render_instance(instance: &InstanceElement) -> String {
    let head = format!(
        "instance {} {}",
        instance.type_ref.id().qualified_name(),
        instance.elem_id.name()
    );
    let mut out = String::new();
    write_block(&mut out, &head, &instance.value, 0);
    out
}

/// Print one element in the declarative grammar.
pub fn render_element(element: &Element) -> String {
    match element {
        Element::Primitive(ty) => render_primitive(ty),
        Element::Object(object) => render_object(object),
        Element::Instance(instance) => render_instance(instance),
        Element::Field(field) => {
            let mut out = format!("model {} {{\n", field.parent_id().qualified_name());
            write_field(&mut out, field, 1);
            out.push_str("}\n");
            out
        }
    }
}

fn default_path(element: &Element) -> SourcePath {
    let id = element.merge_key();
    let mut segments: Vec<&str> = Vec::new();
    if !id.is_builtin() {
        segments.push(id.adapter());
    }
    if let Element::Instance(_) = element {
        segments.push("records");
    }
    segments.push(id.type_name());
    if let Element::Instance(instance) = element {
        if element.merge_key() == instance.elem_id {
            segments.push(instance.elem_id.name());
        }
    }
    SourcePath::new(segments)
}

fn element_paths(element: &Element, index: &PathIndex) -> Vec<SourcePath> {
    if let Some(paths) = index.paths(&element.merge_key()).filter(|p| !p.is_empty()) {
        return paths.to_vec();
    }
    if !element.paths().is_empty() {
        let mut paths = element.paths().to_vec();
        paths.sort();
        paths.dedup();
        return paths;
    }
    vec![default_path(element)]
}

/// The slice of a split object that lives under `path`. The first path also
/// carries the object's annotations, overrides and any field the index does
/// not attribute.
fn object_part(object: &ObjectType, path: &SourcePath, first: &SourcePath, index: &PathIndex) -> ObjectType {
    let is_first = path == first;
    let mut part = ObjectType::new(object.elem_id.clone());
    for (name, field) in &object.fields {
        let home = index
            .paths(&field.elem_id)
            .and_then(|paths| paths.first())
            .unwrap_or(first);
        if home == path {
            part.fields.insert(name.clone(), field.clone());
        }
    }
    if is_first {
        part.annotations = object.annotations.clone();
        part.annotation_types = object.annotation_types.clone();
        part.field_overrides = object.field_overrides.clone();
    }
    part
}

/// Print canonical elements into one source text per path, using the path
/// index to put every element (and every field of a split element) back in
/// the unit it belongs to.
pub fn dump_elements(elements: &[Element], index: &PathIndex) -> BTreeMap<SourcePath, String> {
    let mut ordered: Vec<&Element> = elements.iter().collect();
    ordered.sort_by(|a, b| a.elem_id().cmp(b.elem_id()));

    let mut files: BTreeMap<SourcePath, Vec<String>> = BTreeMap::new();
    for element in ordered {
        let paths = element_paths(element, index);
        match element {
            Element::Object(object) if paths.len() > 1 => {
                let first = &paths[0];
                for path in &paths {
                    let part = object_part(object, path, first, index);
                    if path == first || !part.fields.is_empty() {
                        files
                            .entry(path.clone())
                            .or_default()
                            .push(render_object(&part));
                    }
                }
            }
            _ => {
                let path = paths.into_iter().next().unwrap_or_else(|| default_path(element));
                files.entry(path).or_default().push(render_element(element));
            }
        }
    }

    files
        .into_iter()
        .map(|(path, blocks)| (path, blocks.join("\n")))
        .collect()
}
