// Typed record construction: compiled LineSlice -> T functions
//
// Key design:
// - A target type describes its members and the ways it can be built
//   (positional constructor, default + setters, dynamic row access)
// - Compilation resolves each member's source ordinal against the actual
//   header and picks a getter per member once
// - Compiled activators are cached process-wide under a key that covers
//   every input of the compilation, header names included; the cache is
//   bounded and evicts the least recently used entry

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use tracing::debug;

use crate::error::{ConversionError, CsvError, Result};
use crate::line::{Field, LineSlice};
use crate::row::LiveRow;
use crate::row::RowAccess;
use crate::schema::{
    parse_bool, parse_char, parse_number, Column, ColumnType, FromValue, Header, Schema, Value,
};

/// One member of a target type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub name: &'static str,
    pub data_type: ColumnType,
    pub nullable: bool,
    pub format: Option<&'static str>,
}

impl Member {
    pub fn new(name: &'static str, data_type: ColumnType) -> Self {
        Member {
            name,
            data_type,
            nullable: false,
            format: None,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn with_format(mut self, format: &'static str) -> Self {
        self.format = Some(format);
        self
    }
}

/// A type that records can be materialized into.
///
/// ```
/// use typedcsv::{Args, ColumnType, Construction, Member, TypedRecord};
///
/// struct Point {
///     x: i32,
///     y: i32,
/// }
///
/// impl TypedRecord for Point {
///     fn members() -> Vec<Member> {
///         vec![Member::new("x", ColumnType::I32), Member::new("y", ColumnType::I32)]
///     }
///
///     fn construction() -> Construction<Self> {
///         Construction::new().positional(|mut args: Args| {
///             Ok(Point { x: args.take()?, y: args.take()? })
///         })
///     }
/// }
/// ```
pub trait TypedRecord: Sized + 'static {
    /// Members in declaration order.
    fn members() -> Vec<Member>;

    fn construction() -> Construction<Self>;
}

/// Default-construct, then assign members by declaration index.
pub struct Setters<T> {
    pub default: fn() -> T,
    pub set: fn(&mut T, usize, Value) -> Result<()>,
}

impl<T> Clone for Setters<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Setters<T> {}

/// The ways a target type can be built. At least one must be present.
pub struct Construction<T> {
    /// Takes every member in declaration order
    pub positional: Option<fn(Args) -> Result<T>>,
    pub setters: Option<Setters<T>>,
    /// Generic fallback reading fields by name
    pub dynamic: Option<fn(&dyn RowAccess) -> Result<T>>,
}

impl<T> Default for Construction<T> {
    fn default() -> Self {
        Construction {
            positional: None,
            setters: None,
            dynamic: None,
        }
    }
}

impl<T> Construction<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn positional(mut self, build: fn(Args) -> Result<T>) -> Self {
        self.positional = Some(build);
        self
    }

    pub fn setters(mut self, default: fn() -> T, set: fn(&mut T, usize, Value) -> Result<()>) -> Self {
        self.setters = Some(Setters { default, set });
        self
    }

    pub fn dynamic(mut self, build: fn(&dyn RowAccess) -> Result<T>) -> Self {
        self.dynamic = Some(build);
        self
    }
}

/// Positional constructor arguments, consumed in member order.
pub struct Args {
    values: std::vec::IntoIter<Value>,
    names: Vec<&'static str>,
    next: usize,
}

impl Args {
    fn new(values: Vec<Value>, names: Vec<&'static str>) -> Self {
        Args {
            values: values.into_iter(),
            names,
            next: 0,
        }
    }

    pub fn remaining(&self) -> usize {
        self.values.len()
    }

    /// Next argument as `V`.
    pub fn take<V: FromValue>(&mut self) -> Result<V> {
        let name = self.names.get(self.next).copied().unwrap_or("?");
        self.next += 1;
        let value = self
            .values
            .next()
            .ok_or_else(|| CsvError::argument(format!("no argument left for member {name:?}")))?;
        V::from_value(value).map_err(|e| CsvError::conversion(name, e))
    }
}

/// Closed set of types with a dedicated conversion path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Primitive {
    String,
    Bool,
    Char,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
}

impl Primitive {
    fn of(ty: &ColumnType) -> Option<Self> {
        Some(match ty {
            ColumnType::String => Primitive::String,
            ColumnType::Bool => Primitive::Bool,
            ColumnType::Char => Primitive::Char,
            ColumnType::I8 => Primitive::I8,
            ColumnType::I16 => Primitive::I16,
            ColumnType::I32 => Primitive::I32,
            ColumnType::I64 => Primitive::I64,
            ColumnType::U8 => Primitive::U8,
            ColumnType::U16 => Primitive::U16,
            ColumnType::U32 => Primitive::U32,
            ColumnType::U64 => Primitive::U64,
            ColumnType::F32 => Primitive::F32,
            ColumnType::F64 => Primitive::F64,
            _ => return None,
        })
    }
}

/// How one member's value is pulled out of its field.
#[derive(Debug, Clone)]
enum Getter {
    Primitive { kind: Primitive, nullable: bool },
    Schema(Column),
}

impl Getter {
    fn for_column(column: &Column, use_schema_conversion: bool) -> Self {
        if use_schema_conversion || column.has_custom_converter() {
            return Getter::Schema(column.clone());
        }
        match Primitive::of(column.data_type()) {
            Some(kind) => Getter::Primitive {
                kind,
                nullable: column.is_nullable(),
            },
            None => Getter::Schema(column.clone()),
        }
    }

    fn fetch(&self, field: Field<'_>) -> Result<Value, ConversionError> {
        let (kind, nullable) = match self {
            Getter::Schema(column) => return column.convert(field),
            Getter::Primitive { kind, nullable } => (*kind, *nullable),
        };
        let text = match field {
            Field::Text(text) => text,
            Field::Null if nullable => return Ok(Value::Null),
            Field::Null if kind == Primitive::String => return Ok(Value::String(String::new())),
            Field::Null => {
                return Err(ConversionError::new(
                    "",
                    format!("{kind:?}"),
                    "null value in a non-nullable column",
                ))
            }
        };
        let blank = match kind {
            Primitive::Char => text.is_empty(),
            _ => text.trim().is_empty(),
        };
        if nullable && blank {
            return Ok(Value::Null);
        }
        Ok(match kind {
            Primitive::String => Value::String(text.to_string()),
            Primitive::Bool => Value::Bool(parse_bool(text)?),
            Primitive::Char => Value::Char(parse_char(text)?),
            Primitive::I8 => Value::I8(parse_number(text, &ColumnType::I8)?),
            Primitive::I16 => Value::I16(parse_number(text, &ColumnType::I16)?),
            Primitive::I32 => Value::I32(parse_number(text, &ColumnType::I32)?),
            Primitive::I64 => Value::I64(parse_number(text, &ColumnType::I64)?),
            Primitive::U8 => Value::U8(parse_number(text, &ColumnType::U8)?),
            Primitive::U16 => Value::U16(parse_number(text, &ColumnType::U16)?),
            Primitive::U32 => Value::U32(parse_number(text, &ColumnType::U32)?),
            Primitive::U64 => Value::U64(parse_number(text, &ColumnType::U64)?),
            Primitive::F32 => Value::F32(parse_number(text, &ColumnType::F32)?),
            Primitive::F64 => Value::F64(parse_number(text, &ColumnType::F64)?),
        })
    }
}

/// A member of the target type bound to a source field.
#[derive(Debug, Clone)]
struct Binding {
    member_index: usize,
    column_name: String,
    ordinal: usize,
    getter: Getter,
}

enum Strategy<T> {
    Positional(fn(Args) -> Result<T>),
    Setters(Setters<T>),
    Dynamic(fn(&dyn RowAccess) -> Result<T>),
}

/// Which construction a compiled activator settled on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstructionKind {
    Positional,
    Setters,
    Dynamic,
}

/// Cache key: every input that shapes a compiled activator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActivatorKey {
    type_id: TypeId,
    schema: String,
    members: Vec<String>,
    formats: Vec<Option<String>>,
    header: Vec<String>,
    schema_conversion: bool,
}

impl ActivatorKey {
    pub fn new<T: TypedRecord>(schema: &Schema, header: &Header, use_schema_conversion: bool) -> Self {
        let members = T::members();
        let formats = members
            .iter()
            .map(|m| {
                let column_format = schema
                    .column_for_member(m.name)
                    .and_then(|(_, c)| c.format().map(str::to_string));
                column_format.or_else(|| m.format.map(str::to_string))
            })
            .collect();
        ActivatorKey {
            type_id: TypeId::of::<T>(),
            schema: schema.signature().to_string(),
            members: members
                .iter()
                .map(|m| format!("{:?}:{}:{}", m.name, m.data_type, m.nullable))
                .collect(),
            formats,
            header: header.names().to_vec(),
            schema_conversion: use_schema_conversion,
        }
    }
}

/// A ready-to-call `LineSlice -> T` function.
pub struct CompiledActivator<T> {
    key: ActivatorKey,
    bindings: Vec<Binding>,
    names: Vec<&'static str>,
    strategy: Strategy<T>,
    header: Header,
    schema: Schema,
}

impl<T> std::fmt::Debug for CompiledActivator<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledActivator")
            .field("key", &self.key)
            .field("bindings", &self.bindings)
            .field("construction", &self.construction_kind())
            .finish()
    }
}

impl<T> CompiledActivator<T> {
    pub fn key(&self) -> &ActivatorKey {
        &self.key
    }

    pub fn construction_kind(&self) -> ConstructionKind {
        match self.strategy {
            Strategy::Positional(_) => ConstructionKind::Positional,
            Strategy::Setters(_) => ConstructionKind::Setters,
            Strategy::Dynamic(_) => ConstructionKind::Dynamic,
        }
    }

    /// Source ordinal of each mapped member, by member name.
    pub fn ordinals(&self) -> Vec<(&'static str, usize)> {
        self.names
            .iter()
            .zip(&self.bindings)
            .map(|(name, b)| (*name, b.ordinal))
            .collect()
    }
}

impl<T: TypedRecord> CompiledActivator<T> {
    fn compile(schema: &Schema, header: &Header, use_schema_conversion: bool) -> Result<Self> {
        let key = ActivatorKey::new::<T>(schema, header, use_schema_conversion);
        let members = T::members();
        let construction = T::construction();

        let mut bindings = Vec::with_capacity(members.len());
        let mut all_mapped = true;
        let mut types_match = true;
        for (member_index, member) in members.iter().enumerate() {
            let Some((declared, column)) = schema.column_for_member(member.name) else {
                all_mapped = false;
                continue;
            };
            types_match &= column.data_type() == &member.data_type;
            bindings.push(Binding {
                member_index,
                column_name: column.name().to_string(),
                ordinal: schema.resolve_ordinal(declared, Some(header)),
                getter: Getter::for_column(column, use_schema_conversion),
            });
        }

        let strategy = match construction {
            Construction {
                positional: Some(build),
                ..
            } if all_mapped && types_match => Strategy::Positional(build),
            Construction {
                setters: Some(setters),
                ..
            } => Strategy::Setters(setters),
            Construction {
                dynamic: Some(build),
                ..
            } => Strategy::Dynamic(build),
            _ => {
                return Err(CsvError::argument(format!(
                    "no compatible construction for {}",
                    std::any::type_name::<T>()
                )))
            }
        };

        Ok(CompiledActivator {
            key,
            names: bindings.iter().map(|b| members[b.member_index].name).collect(),
            bindings,
            strategy,
            header: header.clone(),
            schema: schema.clone(),
        })
    }

    /// Build a `T` from the current record.
    pub fn activate(&self, line: &LineSlice<'_>) -> Result<T> {
        match &self.strategy {
            Strategy::Positional(build) => {
                let values = self
                    .bindings
                    .iter()
                    .map(|b| Self::fetch(b, line))
                    .collect::<Result<Vec<_>>>()?;
                build(Args::new(values, self.names.clone()))
            }
            Strategy::Setters(setters) => {
                let mut target = (setters.default)();
                for binding in &self.bindings {
                    let value = Self::fetch(binding, line)?;
                    (setters.set)(&mut target, binding.member_index, value)?;
                }
                Ok(target)
            }
            Strategy::Dynamic(build) => {
                let row = LiveRow::new(line, &self.header).with_schema(&self.schema);
                build(&row)
            }
        }
    }

    fn fetch(binding: &Binding, line: &LineSlice<'_>) -> Result<Value> {
        let field = line.try_field(binding.ordinal)?;
        binding
            .getter
            .fetch(field)
            .map_err(|e| CsvError::conversion(binding.column_name.as_str(), e))
    }
}

/// Most compiled activators kept at once.
const CACHE_CAPACITY: usize = 256;

struct CacheEntry {
    activator: Arc<dyn Any + Send + Sync>,
    last_used: u64,
}

#[derive(Default)]
struct Cache {
    entries: HashMap<ActivatorKey, CacheEntry>,
    /// Bumped on every lookup
    clock: u64,
}

impl Cache {
    fn get_or_compile<T: TypedRecord>(
        &mut self,
        schema: &Schema,
        header: &Header,
        use_schema_conversion: bool,
    ) -> Result<Arc<CompiledActivator<T>>> {
        let key = ActivatorKey::new::<T>(schema, header, use_schema_conversion);
        self.clock += 1;
        let now = self.clock;
        if let Some(entry) = self.entries.get_mut(&key) {
            if let Ok(compiled) = Arc::clone(&entry.activator).downcast::<CompiledActivator<T>>() {
                entry.last_used = now;
                debug!(target_type = std::any::type_name::<T>(), "activator cache hit");
                return Ok(compiled);
            }
        }
        let compiled = Arc::new(CompiledActivator::<T>::compile(
            schema,
            header,
            use_schema_conversion,
        )?);
        debug!(
            target_type = std::any::type_name::<T>(),
            construction = ?compiled.construction_kind(),
            members = compiled.bindings.len(),
            "compiled activator"
        );
        if self.entries.len() >= CACHE_CAPACITY && !self.entries.contains_key(&key) {
            self.evict_least_recent();
        }
        self.entries.insert(
            key,
            CacheEntry {
                activator: compiled.clone(),
                last_used: now,
            },
        );
        Ok(compiled)
    }

    fn evict_least_recent(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_used)
            .map(|(key, _)| key.clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
            debug!(cached = self.entries.len(), "evicted least recently used activator");
        }
    }
}

fn cache() -> &'static Mutex<Cache> {
    static CACHE: OnceLock<Mutex<Cache>> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(Cache::default()))
}

/// Entry point to the process-wide activator cache.
pub struct TypedActivator;

impl TypedActivator {
    /// Compiled activator for `T` reading records shaped by `header`,
    /// reused when every part of the key matches an earlier compilation.
    pub fn compile<T: TypedRecord>(
        schema: &Schema,
        header: &Header,
        use_schema_conversion: bool,
    ) -> Result<Arc<CompiledActivator<T>>> {
        cache()
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_or_compile::<T>(schema, header, use_schema_conversion)
    }

    /// Number of compiled activators currently cached.
    pub fn cached() -> usize {
        cache()
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Behavior, Layout};
    use crate::tokenizer::Tokenizer;

    #[derive(Debug, PartialEq)]
    struct Person {
        name: String,
        age: i32,
        email: Option<String>,
    }

    impl TypedRecord for Person {
        fn members() -> Vec<Member> {
            vec![
                Member::new("name", ColumnType::String),
                Member::new("age", ColumnType::I32),
                Member::new("email", ColumnType::String).nullable(),
            ]
        }

        fn construction() -> Construction<Self> {
            Construction::new().positional(|mut args| {
                Ok(Person {
                    name: args.take()?,
                    age: args.take()?,
                    email: args.take()?,
                })
            })
        }
    }

    #[derive(Debug, Default, PartialEq)]
    struct Settings {
        key: String,
        enabled: bool,
    }

    impl TypedRecord for Settings {
        fn members() -> Vec<Member> {
            vec![
                Member::new("key", ColumnType::String),
                Member::new("enabled", ColumnType::Bool),
            ]
        }

        fn construction() -> Construction<Self> {
            Construction::new().setters(Settings::default, |s, index, value| {
                match index {
                    0 => s.key = FromValue::from_value(value).map_err(|e| CsvError::conversion("key", e))?,
                    1 => s.enabled = FromValue::from_value(value).map_err(|e| CsvError::conversion("enabled", e))?,
                    _ => {}
                }
                Ok(())
            })
        }
    }

    #[derive(Debug, PartialEq)]
    struct Loose {
        label: String,
    }

    impl TypedRecord for Loose {
        fn members() -> Vec<Member> {
            vec![Member::new("label", ColumnType::String)]
        }

        fn construction() -> Construction<Self> {
            Construction::new().dynamic(|row| {
                Ok(Loose {
                    label: row.text("label").unwrap_or_default().to_uppercase(),
                })
            })
        }
    }

    fn person_schema() -> Schema {
        Schema::new(vec![
            Column::new("name", ColumnType::String),
            Column::new("age", ColumnType::I32),
            Column::new("email", ColumnType::String).nullable(true),
        ])
    }

    /// Activate every data line of `input` (first line is the header).
    fn activate_all<T: TypedRecord>(input: &str, schema: &Schema, use_schema: bool) -> Result<Vec<T>> {
        let layout = Layout::default();
        let mut tokenizer = Tokenizer::new(input.as_bytes(), &layout, Behavior::default(), 64)?;
        let header = match tokenizer.next_line()? {
            Some(line) => Header::from_record(&line.to_record()),
            None => return Ok(Vec::new()),
        };
        let activator = TypedActivator::compile::<T>(schema, &header, use_schema)?;
        let mut out = Vec::new();
        while let Some(line) = tokenizer.next_line()? {
            out.push(activator.activate(&line)?);
        }
        Ok(out)
    }

    #[test]
    fn test_positional_construction() {
        let people =
            activate_all::<Person>("name,age,email\nann,31,a@x.io\nbob,40,\n", &person_schema(), false)
                .unwrap();
        assert_eq!(
            people,
            vec![
                Person { name: "ann".into(), age: 31, email: Some("a@x.io".into()) },
                Person { name: "bob".into(), age: 40, email: None },
            ]
        );
    }

    #[test]
    fn test_header_order_does_not_change_values() {
        let schema = person_schema();
        let a = activate_all::<Person>("name,age,email\nann,31,a@x.io\n", &schema, false).unwrap();
        let b = activate_all::<Person>("email,name,age\na@x.io,ann,31\n", &schema, false).unwrap();
        let c = activate_all::<Person>("age,email,name\n31,a@x.io,ann\n", &schema, true).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn test_key_distinguishes_header_order() {
        let schema = person_schema();
        let h1 = Header::new(vec!["name".into(), "age".into(), "email".into()]);
        let h2 = Header::new(vec!["age".into(), "name".into(), "email".into()]);
        let k1 = ActivatorKey::new::<Person>(&schema, &h1, false);
        assert_ne!(k1, ActivatorKey::new::<Person>(&schema, &h2, false));
        assert_ne!(k1, ActivatorKey::new::<Person>(&schema, &h1, true));
        assert_eq!(k1, ActivatorKey::new::<Person>(&schema, &h1, false));

        let formatted = Schema::new(vec![
            Column::new("name", ColumnType::String),
            Column::new("age", ColumnType::I32).with_format("x"),
            Column::new("email", ColumnType::String).nullable(true),
        ]);
        assert_ne!(k1, ActivatorKey::new::<Person>(&formatted, &h1, false));
    }

    #[test]
    fn test_cache_reuses_compiled_activator() {
        let schema = person_schema();
        let header = Header::new(vec!["age".into(), "email".into(), "name".into(), "extra".into()]);
        let first = TypedActivator::compile::<Person>(&schema, &header, false).unwrap();
        let second = TypedActivator::compile::<Person>(&schema, &header, false).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(TypedActivator::cached() >= 1);

        let swapped = Header::new(vec!["name".into(), "email".into(), "age".into(), "extra".into()]);
        let third = TypedActivator::compile::<Person>(&schema, &swapped, false).unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(first.ordinals(), vec![("name", 2), ("age", 0), ("email", 1)]);
        assert_eq!(third.ordinals(), vec![("name", 0), ("age", 2), ("email", 1)]);
    }

    #[test]
    fn test_type_mismatch_falls_back_to_setters_or_fails() {
        // age declared as text in the schema: positional is incompatible
        let schema = Schema::new(vec![
            Column::new("name", ColumnType::String),
            Column::new("age", ColumnType::String),
            Column::new("email", ColumnType::String),
        ]);
        let header = Header::new(vec!["name".into(), "age".into(), "email".into()]);
        let err = TypedActivator::compile::<Person>(&schema, &header, false).unwrap_err();
        assert!(matches!(err, CsvError::Argument(_)));
    }

    #[test]
    fn test_setter_construction() {
        let schema = Schema::for_type::<Settings>();
        let settings =
            activate_all::<Settings>("enabled,key\nyes,dark\nno,beta\n", &schema, false).unwrap();
        assert_eq!(
            settings,
            vec![
                Settings { key: "dark".into(), enabled: true },
                Settings { key: "beta".into(), enabled: false },
            ]
        );
        let header = Header::new(vec!["key".into(), "enabled".into()]);
        let compiled = TypedActivator::compile::<Settings>(&schema, &header, false).unwrap();
        assert_eq!(compiled.construction_kind(), ConstructionKind::Setters);
    }

    #[test]
    fn test_dynamic_construction() {
        let schema = Schema::for_type::<Loose>();
        let rows = activate_all::<Loose>("id,label\n1,hello\n", &schema, false).unwrap();
        assert_eq!(rows, vec![Loose { label: "HELLO".into() }]);
    }

    #[test]
    fn test_conversion_error_names_column() {
        let err = activate_all::<Settings>("key,enabled\nk,maybe\n", &Schema::for_type::<Settings>(), false)
            .unwrap_err();
        match err {
            CsvError::Conversion { column, source } => {
                assert_eq!(column, "enabled");
                assert_eq!(source.value, "maybe");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_custom_converter_goes_through_schema_getter() {
        let schema = Schema::new(vec![
            Column::new("name", ColumnType::String)
                .with_converter(|t| Ok(Value::String(t.trim().to_lowercase()))),
            Column::new("age", ColumnType::I32),
            Column::new("email", ColumnType::String).nullable(true),
        ]);
        let people = activate_all::<Person>("name,age,email\nANN,3,\n", &schema, false).unwrap();
        assert_eq!(people[0].name, "ann");
        assert_eq!(people[0].email, None);
    }

    #[test]
    fn test_members_bind_through_column_member() {
        let schema = Schema::new(vec![
            Column::new("Full Name", ColumnType::String).with_member("name"),
            Column::new("Age (years)", ColumnType::I32).with_member("age"),
            Column::new("email", ColumnType::String).nullable(true),
        ]);
        let people =
            activate_all::<Person>("email,Full Name,Age (years)
,ann,3
", &schema, false).unwrap();
        assert_eq!(people, vec![Person { name: "ann".into(), age: 3, email: None }]);

        let header = Header::new(vec!["Full Name".into(), "Age (years)".into(), "email".into()]);
        let compiled = TypedActivator::compile::<Person>(&schema, &header, false).unwrap();
        assert_eq!(compiled.construction_kind(), ConstructionKind::Positional);
        assert_eq!(compiled.ordinals(), vec![("name", 0), ("age", 1), ("email", 2)]);
    }

    #[test]
    fn test_conversion_error_names_header_column_of_renamed_member() {
        let schema = Schema::new(vec![
            Column::new("Full Name", ColumnType::String).with_member("name"),
            Column::new("Age (years)", ColumnType::I32).with_member("age"),
            Column::new("email", ColumnType::String).nullable(true),
        ]);
        let err = activate_all::<Person>("Full Name,Age (years),email
ann,old,
", &schema, false)
            .unwrap_err();
        assert!(matches!(err, CsvError::Conversion { ref column, .. } if column == "Age (years)"));
    }

    #[test]
    fn test_cache_stays_bounded() {
        let mut cache = Cache::default();
        let header = Header::new(vec!["name".into(), "age".into(), "email".into()]);
        let kept = cache.get_or_compile::<Person>(&person_schema(), &header, false).unwrap();
        for _ in 0..CACHE_CAPACITY * 3 {
            // A fresh converter closure gives every schema its own signature
            let schema = Schema::new(vec![
                Column::new("name", ColumnType::String).with_converter(|t| Ok(Value::String(t.into()))),
                Column::new("age", ColumnType::I32),
                Column::new("email", ColumnType::String).nullable(true),
            ]);
            cache.get_or_compile::<Person>(&schema, &header, false).unwrap();
            assert!(cache.entries.len() <= CACHE_CAPACITY);
            // Touched on every round, so never the eviction victim
            let again = cache.get_or_compile::<Person>(&person_schema(), &header, false).unwrap();
            assert!(Arc::ptr_eq(&kept, &again));
        }
        assert_eq!(cache.entries.len(), CACHE_CAPACITY);
    }

    #[test]
    fn test_recently_used_entry_survives_eviction() {
        let mut cache = Cache::default();
        let header = Header::new(vec!["name".into()]);
        let keys: Vec<ActivatorKey> = (0..3)
            .map(|i| {
                let schema = Schema::new(vec![Column::new(format!("c{i}"), ColumnType::String)]);
                ActivatorKey::new::<Loose>(&schema, &header, false)
            })
            .collect();
        for (i, key) in keys.iter().enumerate() {
            let activator: Arc<dyn Any + Send + Sync> = Arc::new(i);
            cache.entries.insert(key.clone(), CacheEntry { activator, last_used: i as u64 });
        }
        if let Some(entry) = cache.entries.get_mut(&keys[0]) {
            entry.last_used = 10;
        }
        cache.evict_least_recent();
        assert!(cache.entries.contains_key(&keys[0]));
        assert!(!cache.entries.contains_key(&keys[1]));
        assert!(cache.entries.contains_key(&keys[2]));
    }

    #[test]
    fn test_debug_names_construction() {
        let header = Header::new(vec!["name".into(), "age".into(), "email".into()]);
        let compiled = TypedActivator::compile::<Person>(&person_schema(), &header, false).unwrap();
        assert!(format!("{compiled:?}").contains("Positional"));
    }

    #[test]
    fn test_args_report_exhaustion() {
        let mut args = Args::new(vec![Value::I32(1)], vec!["a"]);
        assert_eq!(args.remaining(), 1);
        assert_eq!(args.take::<i32>().unwrap(), 1);
        assert!(matches!(args.take::<i32>(), Err(CsvError::Argument(_))));
    }
}
