/// Replaces each row after the first with its element-wise difference from
/// the preceding row. Wrapping i16 arithmetic; a single row is a no-op.
pub fn delta2d_encode(n_rows: usize, n_columns: usize, buffer: &mut [i16]) {
    for row in (1..n_rows).rev() {
        let offset = row * n_columns;
        for column in 0..n_columns {
            buffer[offset + column] =
                buffer[offset + column].wrapping_sub(buffer[offset - n_columns + column]);
        }
    }
}

pub fn delta2d_decode(n_rows: usize, n_columns: usize, buffer: &mut [i16]) {
    for row in 1..n_rows {
        let offset = row * n_columns;
        for column in 0..n_columns {
            buffer[offset + column] =
                buffer[offset + column].wrapping_add(buffer[offset - n_columns + column]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_differences() {
        let mut values = [10, 11, 12, 13, 12, 13, 14, 15];
        delta2d_encode(2, 4, &mut values);
        assert_eq!(values, [10, 11, 12, 13, 2, 2, 2, 2]);

        delta2d_decode(2, 4, &mut values);
        assert_eq!(values, [10, 11, 12, 13, 12, 13, 14, 15]);
    }

    #[test]
    fn single_row_is_identity() {
        let mut values = [5, -3, 0, 7];
        delta2d_encode(1, 4, &mut values);
        assert_eq!(values, [5, -3, 0, 7]);
        delta2d_decode(1, 4, &mut values);
        assert_eq!(values, [5, -3, 0, 7]);
    }

    #[test]
    fn round_trip() {
        let n_rows = 10;
        let n_columns = 10;
        let mut values = vec![0_i16; n_rows * n_columns];
        for i_row in 0..n_rows {
            let offset = i_row * n_columns;
            let mut v = i_row as i16;
            for i_col in (0..10).step_by(2) {
                values[offset + i_col] = v;
                v += 1;
            }
        }

        let original = values.clone();
        delta2d_encode(n_rows, n_columns, &mut values);
        delta2d_decode(n_rows, n_columns, &mut values);

        for (i, d) in values.iter().enumerate() {
            assert_eq!(
                *d, original[i],
                "failure to decode at index {}, input={}, output={}",
                i, original[i], d
            );
        }
    }

    #[test]
    fn wrapping_at_extremes() {
        let mut values = [i16::MIN, i16::MAX, i16::MAX, i16::MIN];
        delta2d_encode(2, 2, &mut values);
        delta2d_decode(2, 2, &mut values);
        assert_eq!(values, [i16::MIN, i16::MAX, i16::MAX, i16::MIN]);
    }
}
