//! The closed C type model driving classification, formatting and cast
//! semantics. Only integers and pointers are modelled; anything else is
//! outside the supported expression surface and degrades to an opaque node.

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, serde::Serialize)]
pub enum IntWidth {
    Char,
    Short,
    Int,
    Long,
    LongLong,
}

impl IntWidth {
    pub fn bits(self) -> u32 {
        match self {
            IntWidth::Char => 8,
            IntWidth::Short => 16,
            IntWidth::Int => 32,
            IntWidth::Long | IntWidth::LongLong => 64,
        }
    }

    /// Integer conversion rank, per C's usual arithmetic conversions.
    pub fn rank(self) -> u8 {
        match self {
            IntWidth::Char => 1,
            IntWidth::Short => 2,
            IntWidth::Int => 3,
            IntWidth::Long => 4,
            IntWidth::LongLong => 5,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub enum CType {
    Int { width: IntWidth, signed: bool },
    Pointer(Box<CType>),
    Void,
}

impl CType {
    pub fn char() -> Self {
        CType::Int {
            width: IntWidth::Char,
            signed: true,
        }
    }

    pub fn short() -> Self {
        CType::Int {
            width: IntWidth::Short,
            signed: true,
        }
    }

    pub fn int() -> Self {
        CType::Int {
            width: IntWidth::Int,
            signed: true,
        }
    }

    pub fn long() -> Self {
        CType::Int {
            width: IntWidth::Long,
            signed: true,
        }
    }

    pub fn unsigned(width: IntWidth) -> Self {
        CType::Int {
            width,
            signed: false,
        }
    }

    pub fn pointer_to(inner: CType) -> Self {
        CType::Pointer(Box::new(inner))
    }

    pub fn char_ptr() -> Self {
        Self::pointer_to(Self::char())
    }

    pub fn void_ptr() -> Self {
        Self::pointer_to(CType::Void)
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, CType::Pointer(_))
    }

    pub fn is_char_pointer(&self) -> bool {
        matches!(
            self,
            CType::Pointer(inner) if matches!(
                **inner,
                CType::Int { width: IntWidth::Char, .. }
            )
        )
    }

    pub fn is_int(&self) -> bool {
        matches!(self, CType::Int { .. })
    }

    /// The type name as it appears in a rendered cast, e.g. `(short int)n`.
    pub fn spelled(&self) -> String {
        match self {
            CType::Int { width, signed } => {
                let base = match width {
                    IntWidth::Char => "char",
                    IntWidth::Short => "short int",
                    IntWidth::Int => "int",
                    IntWidth::Long => "long int",
                    IntWidth::LongLong => "long long int",
                };
                if *signed {
                    base.to_string()
                } else if *width == IntWidth::Char {
                    "unsigned char".to_string()
                } else {
                    format!("unsigned {base}")
                }
            }
            CType::Pointer(inner) => format!("{} *", inner.spelled()),
            CType::Void => "void".to_string(),
        }
    }

    /// Integer promotion: anything of rank below `int` promotes to `int`.
    pub fn promoted(&self) -> CType {
        match self {
            CType::Int { width, .. } if width.rank() < IntWidth::Int.rank() => CType::int(),
            other => other.clone(),
        }
    }

    /// Common type of a binary operation, a simplified rendition of the
    /// usual arithmetic conversions. Pointer operands keep their own type.
    pub fn common_with(&self, other: &CType) -> CType {
        match (self, other) {
            (CType::Int { .. }, CType::Int { .. }) => {
                let a = self.promoted();
                let b = other.promoted();
                let (
                    CType::Int {
                        width: wa,
                        signed: sa,
                    },
                    CType::Int {
                        width: wb,
                        signed: sb,
                    },
                ) = (&a, &b)
                else {
                    return CType::int();
                };
                if wa.rank() > wb.rank() {
                    a.clone()
                } else if wb.rank() > wa.rank() {
                    b.clone()
                } else {
                    CType::Int {
                        width: *wa,
                        signed: *sa && *sb,
                    }
                }
            }
            _ => self.clone(),
        }
    }
}
