// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Type tags for the koa object model.
//!
//! All runtime types share a single tag space. The numeric tags are
//! ordered so that binary-operator promotion is simply the maximum of
//! the two tag values ([`TypeTag::bigger`]). STRUCT and UNION tags are
//! allocated dynamically per compound declaration, above the static
//! range: struct tags at even offsets, union tags at odd offsets.

#[cfg(test)]
mod types_test;

use core::fmt;

/// A runtime type tag.
///
/// Static tags are the associated constants below; values at or above
/// [`TypeTag::COMPOUND_BASE`] identify user-declared structs and unions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeTag(pub i32);

impl TypeTag {
    /// Wildcard used by builtin argument descriptors: any type accepted.
    pub const ALL: Self = Self(-2);
    /// Dummy type, only valid as a function return type and for the
    /// VOID singleton pushed by value-less returns.
    pub const VOID: Self = Self(0x00);
    pub const NULL: Self = Self(0x01);
    pub const BOOL: Self = Self(0x02);
    pub const CHAR: Self = Self(0x03);
    pub const INT: Self = Self(0x04);
    pub const LONG: Self = Self(0x05);
    pub const INT8: Self = Self(0x06);
    pub const UINT8: Self = Self(0x07);
    pub const INT16: Self = Self(0x08);
    pub const UINT16: Self = Self(0x09);
    pub const INT32: Self = Self(0x0a);
    pub const UINT32: Self = Self(0x0b);
    pub const INT64: Self = Self(0x0c);
    pub const UINT64: Self = Self(0x0d);
    pub const FLOAT: Self = Self(0x0e);
    pub const DOUBLE: Self = Self(0x0f);
    pub const STR: Self = Self(0x10);
    pub const VEC: Self = Self(0x11);
    pub const DICT: Self = Self(0x12);
    pub const FUNC: Self = Self(0x13);
    pub const MOD: Self = Self(0x14);
    pub const FRAME: Self = Self(0x15);
    pub const EXCEPTION: Self = Self(0x16);

    /// First dynamically allocated compound tag.
    pub const COMPOUND_BASE: i32 = 0x17;

    /// Promotion type for a binary numeric operation.
    #[inline]
    #[must_use]
    pub fn bigger(a: Self, b: Self) -> Self {
        if a.0 >= b.0 { a } else { b }
    }

    /// Allocate the struct tag for compound declaration number `index`.
    #[inline]
    #[must_use]
    pub const fn struct_tag(index: u32) -> Self {
        Self(Self::COMPOUND_BASE + 2 * index as i32)
    }

    /// Allocate the union tag for compound declaration number `index`.
    #[inline]
    #[must_use]
    pub const fn union_tag(index: u32) -> Self {
        Self(Self::COMPOUND_BASE + 2 * index as i32 + 1)
    }

    /// BOOL, CHAR and the fixed-width integer types.
    #[inline]
    #[must_use]
    pub const fn is_integer(self) -> bool {
        self.0 >= Self::BOOL.0 && self.0 <= Self::UINT64.0
    }

    /// FLOAT or DOUBLE.
    #[inline]
    #[must_use]
    pub const fn is_floating(self) -> bool {
        self.0 == Self::FLOAT.0 || self.0 == Self::DOUBLE.0
    }

    /// Any type that participates in arithmetic.
    #[inline]
    #[must_use]
    pub const fn is_numeric(self) -> bool {
        self.0 >= Self::BOOL.0 && self.0 <= Self::DOUBLE.0
    }

    /// Types that may own references to other objects and therefore
    /// participate in reference cycles.
    #[inline]
    #[must_use]
    pub const fn is_trackable(self) -> bool {
        self.0 == Self::VEC.0 || self.0 == Self::DICT.0 || self.is_compound()
    }

    /// Dynamically allocated struct or union tag.
    #[inline]
    #[must_use]
    pub const fn is_compound(self) -> bool {
        self.0 >= Self::COMPOUND_BASE
    }

    /// Dynamically allocated struct tag.
    #[inline]
    #[must_use]
    pub const fn is_struct(self) -> bool {
        self.is_compound() && (self.0 - Self::COMPOUND_BASE) % 2 == 0
    }

    /// Dynamically allocated union tag.
    #[inline]
    #[must_use]
    pub const fn is_union(self) -> bool {
        self.is_compound() && (self.0 - Self::COMPOUND_BASE) % 2 == 1
    }

    /// DICT key types: any numeric type or STR.
    #[inline]
    #[must_use]
    pub const fn is_hashable_key(self) -> bool {
        self.is_numeric() || self.0 == Self::STR.0
    }

    /// Type name for error messages.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self.0 {
            0x00 => "void",
            0x01 => "null",
            0x02 => "bool",
            0x03 => "char",
            0x04 => "int",
            0x05 => "long",
            0x06 => "int8",
            0x07 => "uint8",
            0x08 => "int16",
            0x09 => "uint16",
            0x0a => "int32",
            0x0b => "uint32",
            0x0c => "int64",
            0x0d => "uint64",
            0x0e => "float",
            0x0f => "double",
            0x10 => "str",
            0x11 => "vec",
            0x12 => "dict",
            0x13 => "func",
            0x14 => "mod",
            0x15 => "frame",
            0x16 => "exception",
            t if t >= Self::COMPOUND_BASE => {
                if (t - Self::COMPOUND_BASE) % 2 == 0 {
                    "struct"
                } else {
                    "union"
                }
            }
            _ => "unknown",
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
