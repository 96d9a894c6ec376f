use crate::r#box::{Decode, FourCC, Result};

// 4.3
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTypeBox {
    pub major_brand: FourCC,
    pub minor_version: u32,
    pub compatible_brands: Vec<FourCC>,
}

impl FileTypeBox {
    pub fn is_compatible_with(&self, brand: FourCC) -> bool {
        self.major_brand == brand || self.compatible_brands.contains(&brand)
    }
}

impl Decode for FileTypeBox {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        let major_brand = Decode::decode(input)?;
        let minor_version = Decode::decode(input)?;
        let data = *input;
        let compatible_brands = data
            .chunks_exact(4)
            .map(|chunk| FourCC([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();
        *input = &data[data.len()..];
        Ok(Self {
            major_brand,
            minor_version,
            compatible_brands,
        })
    }
}
