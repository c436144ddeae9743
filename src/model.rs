/*!
 Type Registry

 Central authoritative definition of the entity types an expression can talk
 about:
  - Type identity (`TypeId`, name based, cheap to clone)
  - Member metadata (scalar vs. navigation members)
  - Storage table and key members used by data sources
  - A registry that resolves navigation targets by type name

 Entities are plain serde types. At runtime an entity is carried as a
 `serde_json::Value` object whose keys are the member names listed in its
 descriptor, so member lookup by name works the same on both sides of a
 type mapping.

 Usage pattern (high-level):
   let registry = TypeRegistry::builder().register::<Order>().build();
   let order = registry.get(&TypeId::of::<Order>());
   let kind = order.and_then(|d| d.member("Customer"));

 NOTE: This module has no dependency on the expression module. Expressions
 consume descriptors, not the other way round.
*/

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Name based identity of an entity (or anonymous construction) type.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeId(Arc<str>);

impl TypeId {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    /// Identity of a registered entity type.
    pub fn of<T: Entity>() -> Self {
        Self::new(T::TYPE_NAME)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TypeId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for TypeId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// What a member holds. Navigation members are the ones include paths can name.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum MemberKind {
    Scalar,
    Reference(TypeId),
    Collection(TypeId),
}

impl MemberKind {
    pub fn reference(target: impl Into<TypeId>) -> Self {
        Self::Reference(target.into())
    }

    pub fn collection(target: impl Into<TypeId>) -> Self {
        Self::Collection(target.into())
    }

    pub fn is_navigation(&self) -> bool {
        !matches!(self, MemberKind::Scalar)
    }

    /// Type reached by following this member, if it is a navigation member.
    pub fn target(&self) -> Option<&TypeId> {
        match self {
            MemberKind::Scalar => None,
            MemberKind::Reference(t) | MemberKind::Collection(t) => Some(t),
        }
    }
}

/// Descriptor for a single member.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemberDescriptor {
    pub name: String,
    pub kind: MemberKind,
}

/// Descriptor for an entity type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypeDescriptor {
    pub id: TypeId,
    pub table: String,
    pub keys: Vec<String>,
    pub members: Vec<MemberDescriptor>,
}

impl TypeDescriptor {
    /// New descriptor; the storage table defaults to the type name.
    pub fn new(name: impl Into<TypeId>) -> Self {
        let id = name.into();
        Self {
            table: id.as_str().to_string(),
            id,
            keys: Vec::new(),
            members: Vec::new(),
        }
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn with_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keys = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_member(mut self, name: impl Into<String>, kind: MemberKind) -> Self {
        self.members.push(MemberDescriptor {
            name: name.into(),
            kind,
        });
        self
    }

    /// Exact, case-sensitive member lookup.
    pub fn member(&self, name: &str) -> Option<&MemberDescriptor> {
        self.members.iter().find(|m| m.name == name)
    }

    pub fn has_member(&self, name: &str) -> bool {
        self.member(name).is_some()
    }

    pub fn navigation_members(&self) -> impl Iterator<Item = &MemberDescriptor> {
        self.members.iter().filter(|m| m.kind.is_navigation())
    }

    pub fn scalar_members(&self) -> impl Iterator<Item = &MemberDescriptor> {
        self.members.iter().filter(|m| !m.kind.is_navigation())
    }
}

/// A type that repositories can store and expressions can be written against.
///
/// Serialized field names must match the member names in the descriptor.
pub trait Entity: Serialize + DeserializeOwned + Send + Sync + 'static {
    const TYPE_NAME: &'static str;

    fn descriptor() -> TypeDescriptor;
}

/// Implement [`Entity`] for a serde struct from a compact descriptor block.
///
/// ```ignore
/// entity! {
///     Order {
///         name: "Order",
///         table: "orders",
///         keys: ["OrderId"],
///         members: [
///             "OrderId" => MemberKind::Scalar,
///             "Customer" => MemberKind::reference("Customer"),
///         ]
///     }
/// }
/// ```
#[macro_export]
macro_rules! entity {
    (
        $ty:ty {
            name: $name:expr,
            table: $table:expr,
            keys: [$($key:expr),* $(,)?],
            members: [$($member:expr => $kind:expr),* $(,)?] $(,)?
        }
    ) => {
        impl $crate::model::Entity for $ty {
            const TYPE_NAME: &'static str = $name;

            fn descriptor() -> $crate::model::TypeDescriptor {
                $crate::model::TypeDescriptor::new($name)
                    .with_table($table)
                    .with_keys([$($key),*])
                    $(.with_member($member, $kind))*
            }
        }
    };
}

/// Registry of descriptors (immutable after `build`).
#[derive(Debug, Default)]
pub struct TypeRegistry {
    descriptors: HashMap<TypeId, Arc<TypeDescriptor>>,
}

impl TypeRegistry {
    pub fn builder() -> TypeRegistryBuilder {
        TypeRegistryBuilder::default()
    }

    pub fn get(&self, id: &TypeId) -> Option<&Arc<TypeDescriptor>> {
        self.descriptors.get(id)
    }

    pub fn contains(&self, id: &TypeId) -> bool {
        self.descriptors.contains_key(id)
    }

    /// Registered type names, sorted.
    pub fn type_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.descriptors.keys().map(|k| k.as_str()).collect();
        names.sort_unstable();
        names
    }
}

#[derive(Debug, Default)]
pub struct TypeRegistryBuilder {
    descriptors: HashMap<TypeId, Arc<TypeDescriptor>>,
}

impl TypeRegistryBuilder {
    pub fn register<T: Entity>(self) -> Self {
        self.register_descriptor(T::descriptor())
    }

    /// Register a descriptor; a later registration of the same name replaces
    /// the earlier one.
    pub fn register_descriptor(mut self, descriptor: TypeDescriptor) -> Self {
        self.descriptors
            .insert(descriptor.id.clone(), Arc::new(descriptor));
        self
    }

    pub fn build(self) -> Arc<TypeRegistry> {
        Arc::new(TypeRegistry {
            descriptors: self.descriptors,
        })
    }
}
