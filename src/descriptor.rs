//! JVM descriptor parsing into Java source type names.
//!
//! Rules are written against dotted Java names (`boolean`, `java.util.List`,
//! `int[]`), so field and method descriptors from the constant pool are
//! rendered into that form before any comparison happens.

use anyhow::{Context, Result, bail};

/// Render a field descriptor such as `Ljava/util/List;` or `[I` as a Java
/// source type name.
pub fn field_type_name(descriptor: &str) -> Result<String> {
    let (name, rest) = take_type_name(descriptor)
        .with_context(|| format!("invalid field descriptor {descriptor}"))?;
    if !rest.is_empty() {
        bail!("trailing input in field descriptor {descriptor}");
    }
    Ok(name)
}

/// Split a method descriptor such as `(IZ)Ljava/lang/String;` into parameter
/// type names and the return type name.
pub fn method_signature(descriptor: &str) -> Result<(Vec<String>, String)> {
    let mut rest = descriptor
        .strip_prefix('(')
        .with_context(|| format!("invalid method descriptor {descriptor}"))?;
    let mut parameters = Vec::new();
    while !rest.starts_with(')') {
        if rest.is_empty() {
            bail!("unterminated parameter list in method descriptor {descriptor}");
        }
        let (name, tail) = take_type_name(rest)
            .with_context(|| format!("invalid method descriptor {descriptor}"))?;
        parameters.push(name);
        rest = tail;
    }
    let (return_type, tail) = take_type_name(&rest[1..])
        .with_context(|| format!("invalid method descriptor {descriptor}"))?;
    if !tail.is_empty() {
        bail!("trailing input in method descriptor {descriptor}");
    }
    Ok((parameters, return_type))
}

fn take_type_name(input: &str) -> Result<(String, &str)> {
    let mut dimensions = 0usize;
    let mut rest = input;
    while let Some(tail) = rest.strip_prefix('[') {
        dimensions += 1;
        rest = tail;
    }
    let (base, tail) = match rest.as_bytes().first() {
        Some(b'B') => ("byte".to_string(), &rest[1..]),
        Some(b'C') => ("char".to_string(), &rest[1..]),
        Some(b'D') => ("double".to_string(), &rest[1..]),
        Some(b'F') => ("float".to_string(), &rest[1..]),
        Some(b'I') => ("int".to_string(), &rest[1..]),
        Some(b'J') => ("long".to_string(), &rest[1..]),
        Some(b'S') => ("short".to_string(), &rest[1..]),
        Some(b'Z') => ("boolean".to_string(), &rest[1..]),
        Some(b'V') => ("void".to_string(), &rest[1..]),
        Some(b'L') => {
            let end = rest.find(';').context("unterminated object descriptor")?;
            (rest[1..end].replace('/', "."), &rest[end + 1..])
        }
        _ => bail!("unexpected type descriptor {input}"),
    };
    let mut name = base;
    for _ in 0..dimensions {
        name.push_str("[]");
    }
    Ok((name, tail))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_primitives_and_objects() {
        assert_eq!(field_type_name("Z").expect("boolean"), "boolean");
        assert_eq!(field_type_name("J").expect("long"), "long");
        assert_eq!(
            field_type_name("Ljava/util/List;").expect("object"),
            "java.util.List"
        );
    }

    #[test]
    fn renders_arrays() {
        assert_eq!(field_type_name("[I").expect("int array"), "int[]");
        assert_eq!(
            field_type_name("[[Ljava/lang/String;").expect("string matrix"),
            "java.lang.String[][]"
        );
    }

    #[test]
    fn splits_method_descriptors() {
        let (parameters, return_type) =
            method_signature("(ILcom/example/Book;[B)V").expect("signature");
        assert_eq!(parameters, vec!["int", "com.example.Book", "byte[]"]);
        assert_eq!(return_type, "void");

        let (parameters, return_type) = method_signature("()Z").expect("signature");
        assert!(parameters.is_empty());
        assert_eq!(return_type, "boolean");
    }

    #[test]
    fn rejects_malformed_descriptors() {
        assert!(field_type_name("Ljava/util/List").is_err());
        assert!(field_type_name("Q").is_err());
        assert!(field_type_name("ZZ").is_err());
        assert!(method_signature("IZ)V").is_err());
        assert!(method_signature("(IZ").is_err());
    }
}
