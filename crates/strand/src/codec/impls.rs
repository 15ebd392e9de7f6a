//! `Encode`/`Decode` implementations for the built-in shapes
//!
//! Scalars, strings, sequences, sets, arrays, tuples, maps with either
//! key style, pairs, optionals and owned boxes. Signed targets parse
//! with the signed parser and unsigned with the unsigned one.

use super::{CodecResult, Decode, Encode, JsonDeserializer, JsonSerializer, Key, Pair};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, LinkedList, VecDeque};
use std::hash::Hash;
use strand_net::{ReadBuffer, WriteBuffer};

// ── references ──

impl<T: Encode + ?Sized> Encode for &T {
    fn encode<W: WriteBuffer>(&self, s: &mut JsonSerializer<'_, W>) -> CodecResult<()> {
        (**self).encode(s)
    }
}

// ── integers and booleans ──

macro_rules! impl_scalar {
    ($($t:ty),* $(,)?) => {$(
        impl Encode for $t {
            fn encode<W: WriteBuffer>(&self, s: &mut JsonSerializer<'_, W>) -> CodecResult<()> {
                s.raw(self.to_string().as_bytes())
            }
        }

        impl Decode for $t {
            fn decode<R: ReadBuffer>(d: &mut JsonDeserializer<'_, R>) -> CodecResult<Self> {
                let text = d.load_scalar()?;
                match text.trim().parse::<$t>() {
                    Ok(v) => Ok(v),
                    Err(_) => d.syntax_err(),
                }
            }
        }

        impl Key for $t {
            const STRING: bool = false;
        }
    )*};
}

impl_scalar!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, bool);

// ── floats ──

macro_rules! impl_float {
    ($($t:ty),* $(,)?) => {$(
        impl Encode for $t {
            fn encode<W: WriteBuffer>(&self, s: &mut JsonSerializer<'_, W>) -> CodecResult<()> {
                // Debug formatting keeps a fractional part on round
                // values ("7.0") and round-trips exactly.
                s.raw(format!("{:?}", self).as_bytes())
            }
        }

        impl Decode for $t {
            fn decode<R: ReadBuffer>(d: &mut JsonDeserializer<'_, R>) -> CodecResult<Self> {
                let text = d.load_scalar()?;
                match text.trim().parse::<$t>() {
                    Ok(v) => Ok(v),
                    Err(_) => d.syntax_err(),
                }
            }
        }
    )*};
}

impl_float!(f32, f64);

// ── strings ──

impl Encode for str {
    fn encode<W: WriteBuffer>(&self, s: &mut JsonSerializer<'_, W>) -> CodecResult<()> {
        s.save_str(self)
    }
}

impl Encode for String {
    fn encode<W: WriteBuffer>(&self, s: &mut JsonSerializer<'_, W>) -> CodecResult<()> {
        s.save_str(self)
    }
}

impl Decode for String {
    fn decode<R: ReadBuffer>(d: &mut JsonDeserializer<'_, R>) -> CodecResult<Self> {
        d.load_string()
    }
}

impl Key for String {
    const STRING: bool = true;
}

// ── sequences ──

fn encode_seq<'x, W, T, I>(s: &mut JsonSerializer<'_, W>, iter: I) -> CodecResult<()>
where
    W: WriteBuffer,
    T: Encode + 'x,
    I: IntoIterator<Item = &'x T>,
{
    s.byte(b'[')?;
    let mut any = false;
    for item in iter {
        item.encode(s)?;
        s.byte(b',')?;
        any = true;
    }
    if any {
        s.backward(1);
    }
    s.byte(b']')
}

fn decode_seq<R, T, C>(d: &mut JsonDeserializer<'_, R>) -> CodecResult<C>
where
    R: ReadBuffer,
    T: Decode,
    C: Default + Extend<T>,
{
    d.expect_f(b'[')?;
    let mut out = C::default();
    loop {
        if d.peek_char_f()? == b']' {
            break;
        }
        let item = T::decode(d)?;
        out.extend(std::iter::once(item));
        if d.peek_char_f()? == b',' {
            d.get_char()?;
        }
    }
    d.expect_f(b']')?;
    Ok(out)
}

macro_rules! impl_seq_encode {
    ($($c:ident),* $(,)?) => {$(
        impl<T: Encode> Encode for $c<T> {
            fn encode<W: WriteBuffer>(&self, s: &mut JsonSerializer<'_, W>) -> CodecResult<()> {
                encode_seq(s, self)
            }
        }
    )*};
}

impl_seq_encode!(Vec, VecDeque, LinkedList, BTreeSet, HashSet);

macro_rules! impl_seq_decode {
    ($($c:ident: $($bound:path),+;)*) => {$(
        impl<T: Decode $(+ $bound)+> Decode for $c<T> {
            fn decode<R: ReadBuffer>(d: &mut JsonDeserializer<'_, R>) -> CodecResult<Self> {
                decode_seq::<R, T, $c<T>>(d)
            }
        }
    )*};
}

impl_seq_decode!(
    Vec: Sized;
    VecDeque: Sized;
    LinkedList: Sized;
    BTreeSet: Ord;
    HashSet: Eq, Hash;
);

impl<T: Encode, const N: usize> Encode for [T; N] {
    fn encode<W: WriteBuffer>(&self, s: &mut JsonSerializer<'_, W>) -> CodecResult<()> {
        encode_seq(s, self.iter())
    }
}

impl<T: Decode, const N: usize> Decode for [T; N] {
    fn decode<R: ReadBuffer>(d: &mut JsonDeserializer<'_, R>) -> CodecResult<Self> {
        let items: Vec<T> = decode_seq(d)?;
        match <[T; N]>::try_from(items) {
            Ok(arr) => Ok(arr),
            Err(_) => d.syntax_err(),
        }
    }
}

// ── tuples ──

/// The empty argument tuple: `[]` on the wire.
impl Encode for () {
    fn encode<W: WriteBuffer>(&self, s: &mut JsonSerializer<'_, W>) -> CodecResult<()> {
        s.raw(b"[]")
    }
}

impl Decode for () {
    fn decode<R: ReadBuffer>(d: &mut JsonDeserializer<'_, R>) -> CodecResult<Self> {
        d.expect_f(b'[')?;
        d.expect_f(b']')?;
        Ok(())
    }
}

macro_rules! impl_tuple {
    ($(($($name:ident . $idx:tt),+)),+ $(,)?) => {$(
        impl<$($name: Encode),+> Encode for ($($name,)+) {
            fn encode<W: WriteBuffer>(&self, s: &mut JsonSerializer<'_, W>) -> CodecResult<()> {
                s.byte(b'[')?;
                $(
                    self.$idx.encode(s)?;
                    s.byte(b',')?;
                )+
                s.backward(1);
                s.byte(b']')
            }
        }

        impl<$($name: Decode),+> Decode for ($($name,)+) {
            fn decode<R: ReadBuffer>(d: &mut JsonDeserializer<'_, R>) -> CodecResult<Self> {
                d.expect_f(b'[')?;
                let tuple = ($(
                    {
                        let v = $name::decode(d)?;
                        if d.peek_char_f()? == b',' {
                            d.get_char()?;
                        }
                        v
                    },
                )+);
                d.expect_f(b']')?;
                Ok(tuple)
            }
        }
    )+};
}

impl_tuple!(
    (A.0),
    (A.0, B.1),
    (A.0, B.1, C.2),
    (A.0, B.1, C.2, D.3),
    (A.0, B.1, C.2, D.3, E.4),
    (A.0, B.1, C.2, D.3, E.4, F.5),
    (A.0, B.1, C.2, D.3, E.4, F.5, G.6),
    (A.0, B.1, C.2, D.3, E.4, F.5, G.6, H.7),
);

// ── maps ──

fn encode_map<'x, W, K, V, I>(s: &mut JsonSerializer<'_, W>, iter: I) -> CodecResult<()>
where
    W: WriteBuffer,
    K: Key + 'x,
    V: Encode + 'x,
    I: IntoIterator<Item = (&'x K, &'x V)>,
{
    let mut any = false;
    if K::STRING {
        s.byte(b'{')?;
        for (k, v) in iter {
            k.encode(s)?;
            s.byte(b':')?;
            v.encode(s)?;
            s.byte(b',')?;
            any = true;
        }
        if any {
            s.backward(1);
        }
        s.byte(b'}')
    } else {
        s.byte(b'[')?;
        for (k, v) in iter {
            s.raw(b"{\"key\":")?;
            k.encode(s)?;
            s.raw(b",\"value\":")?;
            v.encode(s)?;
            s.raw(b"},")?;
            any = true;
        }
        if any {
            s.backward(1);
        }
        s.byte(b']')
    }
}

/// Either bracket style is accepted on decode, for forward tolerance
/// with older encoders of both map forms.
fn decode_map<R, K, V, C>(d: &mut JsonDeserializer<'_, R>) -> CodecResult<C>
where
    R: ReadBuffer,
    K: Key,
    V: Decode,
    C: Default + Extend<(K, V)>,
{
    let open = d.get_char_f()?;
    if open != b'{' && open != b'[' {
        return d.syntax_err();
    }
    let mut out = C::default();
    loop {
        let c = d.peek_char_f()?;
        if c == b'}' || c == b']' {
            break;
        }
        let entry = if K::STRING {
            let k = K::decode(d)?;
            d.expect_f(b':')?;
            let v = V::decode(d)?;
            (k, v)
        } else {
            d.load_entry::<K, V>()?
        };
        out.extend(std::iter::once(entry));
        if d.peek_char_f()? == b',' {
            d.get_char()?;
        }
    }
    let close = d.get_char_f()?;
    if close != b'}' && close != b']' {
        return d.syntax_err();
    }
    Ok(out)
}

impl<K: Key + Ord, V: Encode> Encode for BTreeMap<K, V> {
    fn encode<W: WriteBuffer>(&self, s: &mut JsonSerializer<'_, W>) -> CodecResult<()> {
        encode_map(s, self)
    }
}

impl<K: Key + Ord, V: Decode> Decode for BTreeMap<K, V> {
    fn decode<R: ReadBuffer>(d: &mut JsonDeserializer<'_, R>) -> CodecResult<Self> {
        decode_map(d)
    }
}

impl<K: Key + Eq + Hash, V: Encode> Encode for HashMap<K, V> {
    fn encode<W: WriteBuffer>(&self, s: &mut JsonSerializer<'_, W>) -> CodecResult<()> {
        encode_map(s, self)
    }
}

impl<K: Key + Eq + Hash, V: Decode> Decode for HashMap<K, V> {
    fn decode<R: ReadBuffer>(d: &mut JsonDeserializer<'_, R>) -> CodecResult<Self> {
        decode_map(d)
    }
}

// ── pairs ──

impl<K: Key, V: Encode> Encode for Pair<K, V> {
    fn encode<W: WriteBuffer>(&self, s: &mut JsonSerializer<'_, W>) -> CodecResult<()> {
        if K::STRING {
            s.byte(b'{')?;
            self.key.encode(s)?;
            s.byte(b':')?;
            self.value.encode(s)?;
            s.byte(b'}')
        } else {
            s.byte(b'[')?;
            s.raw(b"{\"key\":")?;
            self.key.encode(s)?;
            s.raw(b",\"value\":")?;
            self.value.encode(s)?;
            s.raw(b"}]")
        }
    }
}

impl<K: Key, V: Decode> Decode for Pair<K, V> {
    fn decode<R: ReadBuffer>(d: &mut JsonDeserializer<'_, R>) -> CodecResult<Self> {
        let open = d.get_char_f()?;
        if open != b'{' && open != b'[' {
            return d.syntax_err();
        }
        let (key, value) = if K::STRING {
            let k = K::decode(d)?;
            d.expect_f(b':')?;
            let v = V::decode(d)?;
            (k, v)
        } else {
            d.load_entry::<K, V>()?
        };
        let close = d.get_char_f()?;
        if close != b'}' && close != b']' {
            return d.syntax_err();
        }
        Ok(Pair { key, value })
    }
}

// ── optionals and owned references ──

impl<T: Encode> Encode for Option<T> {
    fn encode<W: WriteBuffer>(&self, s: &mut JsonSerializer<'_, W>) -> CodecResult<()> {
        match self {
            Some(v) => v.encode(s),
            None => s.raw(b"null"),
        }
    }
}

impl<T: Decode> Decode for Option<T> {
    fn decode<R: ReadBuffer>(d: &mut JsonDeserializer<'_, R>) -> CodecResult<Self> {
        if d.take_null()? {
            Ok(None)
        } else {
            T::decode(d).map(Some)
        }
    }
}

/// A box always holds a value; absence is `Option<Box<T>>`.
impl<T: Encode> Encode for Box<T> {
    fn encode<W: WriteBuffer>(&self, s: &mut JsonSerializer<'_, W>) -> CodecResult<()> {
        (**self).encode(s)
    }
}

impl<T: Decode> Decode for Box<T> {
    fn decode<R: ReadBuffer>(d: &mut JsonDeserializer<'_, R>) -> CodecResult<Self> {
        T::decode(d).map(Box::new)
    }
}
