//! DepthGuard - serializer adapter that fails past a nesting limit
//!
//! Metadata can be self-referential (`Rc<RefCell<..>>` cycles, hand-written
//! `Serialize` impls). Plain serialization of such a value recurses until the
//! stack overflows, so every nested value is re-wrapped here with its depth
//! and rejected with a serializer error once the limit is crossed.

use std::fmt::Display;

use serde::ser::{
    self, Serialize, SerializeMap, SerializeSeq, SerializeStruct, SerializeStructVariant,
    SerializeTuple, SerializeTupleStruct, SerializeTupleVariant, Serializer,
};

/// Deepest nesting accepted for metadata
pub const MAX_META_DEPTH: usize = 64;

/// `value` serialized with a nesting limit of `max_depth`
pub struct DepthGuard<'a, T: ?Sized> {
    value: &'a T,
    depth: usize,
    max_depth: usize,
}

impl<'a, T: ?Sized> DepthGuard<'a, T> {
    pub fn new(value: &'a T, max_depth: usize) -> Self {
        Self {
            value,
            depth: 0,
            max_depth,
        }
    }
}

impl<T: Serialize + ?Sized> Serialize for DepthGuard<'_, T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.depth > self.max_depth {
            return Err(ser::Error::custom(format_args!(
                "nesting deeper than {} levels (cyclic value?)",
                self.max_depth
            )));
        }
        self.value.serialize(Guarded {
            inner: serializer,
            depth: self.depth,
            max_depth: self.max_depth,
        })
    }
}

/// Wraps a serializer, handing nested values back through [`DepthGuard`]
struct Guarded<S> {
    inner: S,
    depth: usize,
    max_depth: usize,
}

impl<S> Guarded<S> {
    fn nested<'a, T: ?Sized>(&self, value: &'a T) -> DepthGuard<'a, T> {
        DepthGuard {
            value,
            depth: self.depth + 1,
            max_depth: self.max_depth,
        }
    }
}

macro_rules! forward_scalars {
    ($($method:ident($ty:ty)),* $(,)?) => {
        $(
            fn $method(self, v: $ty) -> Result<Self::Ok, Self::Error> {
                self.inner.$method(v)
            }
        )*
    };
}

impl<S: Serializer> Serializer for Guarded<S> {
    type Ok = S::Ok;
    type Error = S::Error;
    type SerializeSeq = Compound<S::SerializeSeq>;
    type SerializeTuple = Compound<S::SerializeTuple>;
    type SerializeTupleStruct = Compound<S::SerializeTupleStruct>;
    type SerializeTupleVariant = Compound<S::SerializeTupleVariant>;
    type SerializeMap = Compound<S::SerializeMap>;
    type SerializeStruct = Compound<S::SerializeStruct>;
    type SerializeStructVariant = Compound<S::SerializeStructVariant>;

    forward_scalars!(
        serialize_bool(bool),
        serialize_i8(i8),
        serialize_i16(i16),
        serialize_i32(i32),
        serialize_i64(i64),
        serialize_i128(i128),
        serialize_u8(u8),
        serialize_u16(u16),
        serialize_u32(u32),
        serialize_u64(u64),
        serialize_u128(u128),
        serialize_f32(f32),
        serialize_f64(f64),
        serialize_char(char),
        serialize_str(&str),
        serialize_bytes(&[u8]),
        serialize_unit_struct(&'static str),
    );

    fn serialize_none(self) -> Result<Self::Ok, Self::Error> {
        self.inner.serialize_none()
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Result<Self::Ok, Self::Error> {
        let nested = self.nested(value);
        self.inner.serialize_some(&nested)
    }

    fn serialize_unit(self) -> Result<Self::Ok, Self::Error> {
        self.inner.serialize_unit()
    }

    fn serialize_unit_variant(
        self,
        name: &'static str,
        variant_index: u32,
        variant: &'static str,
    ) -> Result<Self::Ok, Self::Error> {
        self.inner.serialize_unit_variant(name, variant_index, variant)
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        name: &'static str,
        value: &T,
    ) -> Result<Self::Ok, Self::Error> {
        let nested = self.nested(value);
        self.inner.serialize_newtype_struct(name, &nested)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        name: &'static str,
        variant_index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<Self::Ok, Self::Error> {
        let nested = self.nested(value);
        self.inner
            .serialize_newtype_variant(name, variant_index, variant, &nested)
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<Self::SerializeSeq, Self::Error> {
        let (depth, max_depth) = (self.depth, self.max_depth);
        let seq = self.inner.serialize_seq(len)?;
        Ok(Compound::at(seq, depth + 1, max_depth))
    }

    fn serialize_tuple(self, len: usize) -> Result<Self::SerializeTuple, Self::Error> {
        let (depth, max_depth) = (self.depth, self.max_depth);
        let tuple = self.inner.serialize_tuple(len)?;
        Ok(Compound::at(tuple, depth + 1, max_depth))
    }

    fn serialize_tuple_struct(
        self,
        name: &'static str,
        len: usize,
    ) -> Result<Self::SerializeTupleStruct, Self::Error> {
        let (depth, max_depth) = (self.depth, self.max_depth);
        let tuple = self.inner.serialize_tuple_struct(name, len)?;
        Ok(Compound::at(tuple, depth + 1, max_depth))
    }

    fn serialize_tuple_variant(
        self,
        name: &'static str,
        variant_index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<Self::SerializeTupleVariant, Self::Error> {
        let (depth, max_depth) = (self.depth, self.max_depth);
        let tuple = self
            .inner
            .serialize_tuple_variant(name, variant_index, variant, len)?;
        Ok(Compound::at(tuple, depth + 1, max_depth))
    }

    fn serialize_map(self, len: Option<usize>) -> Result<Self::SerializeMap, Self::Error> {
        let (depth, max_depth) = (self.depth, self.max_depth);
        let map = self.inner.serialize_map(len)?;
        Ok(Compound::at(map, depth + 1, max_depth))
    }

    fn serialize_struct(
        self,
        name: &'static str,
        len: usize,
    ) -> Result<Self::SerializeStruct, Self::Error> {
        let (depth, max_depth) = (self.depth, self.max_depth);
        let st = self.inner.serialize_struct(name, len)?;
        Ok(Compound::at(st, depth + 1, max_depth))
    }

    fn serialize_struct_variant(
        self,
        name: &'static str,
        variant_index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<Self::SerializeStructVariant, Self::Error> {
        let (depth, max_depth) = (self.depth, self.max_depth);
        let st = self
            .inner
            .serialize_struct_variant(name, variant_index, variant, len)?;
        Ok(Compound::at(st, depth + 1, max_depth))
    }

    fn collect_str<T: Display + ?Sized>(self, value: &T) -> Result<Self::Ok, Self::Error> {
        self.inner.collect_str(value)
    }

    fn is_human_readable(&self) -> bool {
        self.inner.is_human_readable()
    }
}

/// Compound state whose elements are serialized one level deeper
struct Compound<C> {
    inner: C,
    depth: usize,
    max_depth: usize,
}

impl<C> Compound<C> {
    fn at(inner: C, depth: usize, max_depth: usize) -> Self {
        Self {
            inner,
            depth,
            max_depth,
        }
    }

    fn guard<'a, T: ?Sized>(&self, value: &'a T) -> DepthGuard<'a, T> {
        DepthGuard {
            value,
            depth: self.depth,
            max_depth: self.max_depth,
        }
    }
}

impl<C: SerializeSeq> SerializeSeq for Compound<C> {
    type Ok = C::Ok;
    type Error = C::Error;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), Self::Error> {
        let guarded = self.guard(value);
        self.inner.serialize_element(&guarded)
    }

    fn end(self) -> Result<Self::Ok, Self::Error> {
        self.inner.end()
    }
}

impl<C: SerializeTuple> SerializeTuple for Compound<C> {
    type Ok = C::Ok;
    type Error = C::Error;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), Self::Error> {
        let guarded = self.guard(value);
        self.inner.serialize_element(&guarded)
    }

    fn end(self) -> Result<Self::Ok, Self::Error> {
        self.inner.end()
    }
}

impl<C: SerializeTupleStruct> SerializeTupleStruct for Compound<C> {
    type Ok = C::Ok;
    type Error = C::Error;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), Self::Error> {
        let guarded = self.guard(value);
        self.inner.serialize_field(&guarded)
    }

    fn end(self) -> Result<Self::Ok, Self::Error> {
        self.inner.end()
    }
}

impl<C: SerializeTupleVariant> SerializeTupleVariant for Compound<C> {
    type Ok = C::Ok;
    type Error = C::Error;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), Self::Error> {
        let guarded = self.guard(value);
        self.inner.serialize_field(&guarded)
    }

    fn end(self) -> Result<Self::Ok, Self::Error> {
        self.inner.end()
    }
}

impl<C: SerializeMap> SerializeMap for Compound<C> {
    type Ok = C::Ok;
    type Error = C::Error;

    fn serialize_key<T: Serialize + ?Sized>(&mut self, key: &T) -> Result<(), Self::Error> {
        let guarded = self.guard(key);
        self.inner.serialize_key(&guarded)
    }

    fn serialize_value<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), Self::Error> {
        let guarded = self.guard(value);
        self.inner.serialize_value(&guarded)
    }

    fn end(self) -> Result<Self::Ok, Self::Error> {
        self.inner.end()
    }
}

impl<C: SerializeStruct> SerializeStruct for Compound<C> {
    type Ok = C::Ok;
    type Error = C::Error;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), Self::Error> {
        let guarded = self.guard(value);
        self.inner.serialize_field(key, &guarded)
    }

    fn skip_field(&mut self, key: &'static str) -> Result<(), Self::Error> {
        self.inner.skip_field(key)
    }

    fn end(self) -> Result<Self::Ok, Self::Error> {
        self.inner.end()
    }
}

impl<C: SerializeStructVariant> SerializeStructVariant for Compound<C> {
    type Ok = C::Ok;
    type Error = C::Error;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), Self::Error> {
        let guarded = self.guard(value);
        self.inner.serialize_field(key, &guarded)
    }

    fn skip_field(&mut self, key: &'static str) -> Result<(), Self::Error> {
        self.inner.skip_field(key)
    }

    fn end(self) -> Result<Self::Ok, Self::Error> {
        self.inner.end()
    }
}
