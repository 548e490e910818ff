/// Occupancy bitmap, one bit per frame.
#[derive(Debug, Clone)]
pub struct Bitmap {
    bitmap: Vec<u8>,
    len: usize,
}

impl Bitmap {
    /// How many bytes are required to track `len` frames
    pub fn size(len: usize) -> usize {
        len / 8 + if len % 8 == 0 { 0 } else { 1 }
    }

    pub fn new(len: usize) -> Bitmap {
        let mut bitmap = Vec::new();
        bitmap.resize(Bitmap::size(len), 0);
        Bitmap { bitmap, len }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_set(&self, bit: usize) -> bool {
        bit < self.len && self.bitmap[bit / 8] & (1 << (bit % 8)) != 0
    }

    pub fn set(&mut self, bit: usize) {
        self.bitmap[bit / 8] |= 1 << (bit % 8);
    }

    pub fn clear(&mut self, bit: usize) {
        self.bitmap[bit / 8] &= !(1 << (bit % 8));
    }

    /// Lowest `n` clear bits, in ascending order. Fewer when the map is full.
    pub fn find_clear(&self, n: usize) -> Vec<usize> {
        let mut found = Vec::with_capacity(n);
        for i in 0..self.bitmap.len() {
            if self.bitmap[i] == 0xff {
                continue;
            }
            for j in 0..8 {
                let bit = i * 8 + j;
                if found.len() == n || bit >= self.len {
                    return found;
                }
                if self.bitmap[i] & (1 << j) == 0 {
                    found.push(bit);
                }
            }
        }
        found
    }

    pub fn count_set(&self) -> usize {
        self.bitmap
            .iter()
            .map(|byte| byte.count_ones() as usize)
            .sum()
    }
}
