//! Tagged unions
//!
//! A [`Fork`] peeks at a control scalar and picks the option registered for
//! it. Raw and external values share the `{name, data}` shape.

use crate::error::{Annotate, CodecError, Result};
use crate::pass::Pass;
use crate::rom::{Rom, Width};
use crate::schema::Optimizer;
use crate::types::scalar::format_radix;
use crate::types::{Codec, TypeRef};
use crate::value::{Fields, Value};

/// Which control values select an option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForkArm {
    Tagged(u32),
    /// Any control value without a tagged option
    Default,
}

/// One arm of a [`Fork`].
#[derive(Debug, Clone)]
pub struct ForkOption {
    pub arm: ForkArm,
    pub name: String,
    pub ty: TypeRef,
    /// The option's own type consumes the control bytes
    pub use_control: bool,
}

impl ForkOption {
    pub fn tagged(tag: u32, name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            arm: ForkArm::Tagged(tag),
            name: name.into(),
            ty,
            use_control: false,
        }
    }

    /// Default arm; always re-reads the control value.
    pub fn default(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            arm: ForkArm::Default,
            name: name.into(),
            ty,
            use_control: true,
        }
    }

    pub fn using_control(mut self) -> Self {
        self.use_control = true;
        self
    }
}

#[derive(Debug, Clone)]
pub struct Fork {
    pub control: Width,
    pub options: Vec<ForkOption>,
}

impl Fork {
    pub fn new(control: Width, options: Vec<ForkOption>) -> Result<Self> {
        for (i, option) in options.iter().enumerate() {
            let earlier = &options[..i];
            if earlier.iter().any(|o| o.name == option.name) {
                return Err(CodecError::Definition(format!(
                    "duplicate fork option {:?}",
                    option.name
                )));
            }
            match option.arm {
                ForkArm::Tagged(tag) if tag > control.max() => {
                    return Err(CodecError::Definition(format!(
                        "fork tag {tag:#x} of {:?} does not fit the control width",
                        option.name
                    )));
                }
                ForkArm::Tagged(tag) if earlier.iter().any(|o| o.arm == ForkArm::Tagged(tag)) => {
                    return Err(CodecError::Definition(format!(
                        "fork tag {tag:#x} is claimed twice"
                    )));
                }
                ForkArm::Default if !option.use_control => {
                    return Err(CodecError::Definition(format!(
                        "default fork option {:?} must use the control value",
                        option.name
                    )));
                }
                ForkArm::Default if earlier.iter().any(|o| o.arm == ForkArm::Default) => {
                    return Err(CodecError::Definition("fork has two default options".into()));
                }
                _ => {}
            }
        }
        Ok(Self { control, options })
    }

    fn missing(&self, key: String) -> CodecError {
        CodecError::SchemaMissingOption {
            key,
            options: self.options.iter().map(|o| o.name.clone()).collect(),
        }
    }

    fn by_tag(&self, tag: u32) -> Result<&ForkOption> {
        self.options
            .iter()
            .find(|o| o.arm == ForkArm::Tagged(tag))
            .or_else(|| self.options.iter().find(|o| o.arm == ForkArm::Default))
            .ok_or_else(|| self.missing(format_radix(tag, 16)))
    }

    fn by_name(&self, name: &str) -> Result<&ForkOption> {
        self.options
            .iter()
            .find(|o| o.name == name)
            .ok_or_else(|| self.missing(name.to_string()))
    }

    /// Selected option and payload of a `{name, data}` value.
    fn split<'v>(&self, value: &'v Value) -> Result<(&ForkOption, &'v Value)> {
        let option = self.by_name(value.field("name")?.as_text()?)?;
        Ok((option, value.field("data")?))
    }
}

fn tagged(name: &str, data: Value) -> Value {
    let mut fields = Fields::new();
    fields.insert("name".into(), Value::text(name));
    fields.insert("data".into(), data);
    Value::Map(fields)
}

impl Codec for Fork {
    fn decode(&self, rom: &mut Rom, pass: &mut Pass) -> Result<Value> {
        let option = self.by_tag(rom.peek(self.control)?)?;
        if !option.use_control {
            rom.read(self.control)?;
        }
        let data = option.ty.decode(rom, pass).within(&option.name)?;
        Ok(tagged(&option.name, data))
    }

    fn encode(&self, value: &Value, rom: &mut Rom, pass: &mut Pass) -> Result<()> {
        let (option, data) = self.split(value)?;
        if !option.use_control {
            // Untagged options are rejected at construction
            if let ForkArm::Tagged(tag) = option.arm {
                rom.write(tag, self.control)?;
            }
        }
        option.ty.encode(data, rom, pass).within(&option.name)
    }

    fn parse(&self, external: &Value) -> Result<Value> {
        let (option, data) = self.split(external)?;
        let data = option.ty.parse(data).within(&option.name)?;
        Ok(tagged(&option.name, data))
    }

    fn format(&self, value: &Value) -> Result<Value> {
        let (option, data) = self.split(value)?;
        let data = option.ty.format(data).within(&option.name)?;
        Ok(tagged(&option.name, data))
    }

    fn optimize(&self, value: &Value, optimizer: &mut Optimizer<'_>) -> Result<Value> {
        let (option, data) = self.split(value)?;
        let data = option.ty.optimize(data, optimizer).within(&option.name)?;
        Ok(tagged(&option.name, data))
    }

    fn child(&self, name: &str) -> Option<TypeRef> {
        self.options
            .iter()
            .find(|o| o.name == name)
            .map(|o| o.ty.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map;
    use crate::rom::AddressMode;
    use crate::types::{Empty, UInt, node};

    fn rom(bytes: &[u8]) -> Rom {
        let mut data = bytes.to_vec();
        data.resize(8, 0);
        let mut rom = Rom::new(data, AddressMode::HiRom);
        rom.seek(0xC00000).unwrap();
        rom
    }

    fn abc() -> Fork {
        Fork::new(
            Width::Byte,
            vec![
                ForkOption::tagged(0x00, "a", node(UInt::hex(Width::Word))),
                ForkOption::tagged(0x01, "b", node(Empty)),
                ForkOption::default("c", node(UInt::hex(Width::Byte))),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_default_arm_keeps_control() {
        let fork = abc();
        let mut pass = Pass::new();
        let mut input = rom(&[0x05, 0x99]);
        let value = fork.decode(&mut input, &mut pass).unwrap();
        assert_eq!(value, map! { "name" => "c", "data" => 5i64 });
        assert_eq!(input.offset().unwrap(), 0xC00001);

        let mut out = rom(&[]);
        fork.encode(&value, &mut out, &mut pass).unwrap();
        assert_eq!(out.as_bytes()[0], 0x05);
    }

    #[test]
    fn test_tagged_arm_skips_control() {
        let fork = abc();
        let mut pass = Pass::new();
        let value = fork.decode(&mut rom(&[0x00, 0x34, 0x12]), &mut pass).unwrap();
        assert_eq!(value, map! { "name" => "a", "data" => 0x1234i64 });

        let mut out = rom(&[0xFF; 3]);
        fork.encode(&value, &mut out, &mut pass).unwrap();
        assert_eq!(&out.as_bytes()[..3], &[0x00, 0x34, 0x12]);

        let formatted = fork.format(&value).unwrap();
        assert_eq!(formatted, map! { "name" => "a", "data" => "0x1234" });
        assert_eq!(fork.parse(&formatted).unwrap(), value);
    }

    #[test]
    fn test_unknown_name_lists_options() {
        let fork = abc();
        let mut pass = Pass::new();
        let err = fork
            .encode(&map! { "name" => "z", "data" => Value::Null }, &mut rom(&[]), &mut pass)
            .unwrap_err();
        assert_eq!(
            err,
            CodecError::SchemaMissingOption {
                key: "z".into(),
                options: vec!["a".into(), "b".into(), "c".into()],
            }
        );
    }

    #[test]
    fn test_unknown_tag_without_default() {
        let fork = Fork::new(Width::Byte, vec![ForkOption::tagged(0x00, "a", node(Empty))]).unwrap();
        let mut pass = Pass::new();
        let err = fork.decode(&mut rom(&[0x07]), &mut pass).unwrap_err();
        assert!(matches!(err, CodecError::SchemaMissingOption { ref key, .. } if key == "0x7"));
    }

    #[test]
    fn test_construction_checks() {
        let mut default = ForkOption::default("d", node(Empty));
        default.use_control = false;
        assert!(Fork::new(Width::Byte, vec![default]).is_err());

        let twice = vec![
            ForkOption::tagged(1, "a", node(Empty)),
            ForkOption::tagged(1, "b", node(Empty)),
        ];
        assert!(Fork::new(Width::Byte, twice).is_err());

        let wide = vec![ForkOption::tagged(0x100, "a", node(Empty))];
        assert!(Fork::new(Width::Byte, wide).is_err());
    }

    #[test]
    fn test_option_errors_are_named() {
        let fork = abc();
        let err = fork
            .parse(&map! { "name" => "a", "data" => "zz" })
            .unwrap_err();
        assert_eq!(err.path(), vec!["a"]);
    }
}
