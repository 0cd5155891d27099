//! Intermediate representation for parsed bytecode modules.
//!
//! A `ClassDef` is fully self-describing: kind flags, field and method
//! signatures, and referenced string literals all come from the parsed
//! class file, so matching never has to load the class into a runtime.

/// One bytecode module inside a container, holding its parsed classes.
#[derive(Clone, Debug)]
pub struct Module {
    pub name: String,
    pub classes: Vec<ClassDef>,
}

/// Parsed structural metadata for one class, interface, or enum.
#[derive(Clone, Debug, Default)]
pub struct ClassDef {
    /// Dotted qualified name, e.g. `com.example.Book`.
    pub qualified_name: String,
    pub is_interface: bool,
    pub is_abstract: bool,
    pub is_enum: bool,
    pub fields: Vec<FieldDef>,
    pub methods: Vec<MethodDef>,
    /// Constant names declared by an enum, in declaration order.
    pub enum_constants: Vec<String>,
    /// String literals referenced anywhere in the class, de-duplicated.
    pub strings: Vec<String>,
}

/// Declared field with its type rendered as a Java source name.
#[derive(Clone, Debug)]
pub struct FieldDef {
    pub name: String,
    pub type_name: String,
}

/// Declared method with signature data rendered as Java source names.
#[derive(Clone, Debug)]
pub struct MethodDef {
    pub name: String,
    pub return_type: String,
    pub parameter_types: Vec<String>,
    /// Modifier keywords in canonical order, e.g. `public static`.
    pub modifiers: String,
    /// String literals loaded by the method body, in first-occurrence order.
    pub strings: Vec<String>,
}
