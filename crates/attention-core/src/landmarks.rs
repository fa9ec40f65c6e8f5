//! 面部关键点集合
//!
//! 索引遵循 478 点面网格约定（含虹膜 468-477），同一语义点在每一帧都位于同一索引。

use serde::{Deserialize, Serialize};

use crate::geometry::Point;

pub const LEFT_EYE: [usize; 6] = [362, 385, 387, 263, 373, 380];
pub const RIGHT_EYE: [usize; 6] = [33, 160, 158, 133, 153, 144];
pub const LEFT_IRIS: [usize; 5] = [468, 469, 470, 471, 472];
pub const RIGHT_IRIS: [usize; 5] = [473, 474, 475, 476, 477];

/// 姿态求解用的 6 个标准点：鼻尖、下巴、左眼外角、右眼外角、左嘴角、右嘴角
pub const HEAD_POSE: [usize; 6] = [1, 152, 263, 33, 287, 57];

pub const FULL_MESH_SIZE: usize = 478;

/// 一张人脸的关键点。允许稀疏：远端服务可能只返回部分索引。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FaceLandmarks {
    points: Vec<Option<Point>>,
}

impl FaceLandmarks {
    /// 稠密输入，下标即索引
    pub fn new(points: Vec<Point>) -> Self {
        Self {
            points: points.into_iter().map(Some).collect(),
        }
    }

    /// 稀疏输入 `(index, point)`，重复索引以后者为准；超出网格范围的索引被丢弃
    pub fn from_indexed<I>(indexed: I) -> Self
    where
        I: IntoIterator<Item = (usize, Point)>,
    {
        let mut points: Vec<Option<Point>> = Vec::new();
        for (idx, point) in indexed {
            if idx >= FULL_MESH_SIZE {
                tracing::debug!(index = idx, "landmark index out of mesh range, skipped");
                continue;
            }
            if idx >= points.len() {
                points.resize(idx + 1, None);
            }
            points[idx] = Some(point);
        }
        Self { points }
    }

    pub fn get(&self, index: usize) -> Option<Point> {
        self.points.get(index).copied().flatten()
    }

    /// 按索引取子集，缺失的点被跳过，因此结果可能短于 `indices`
    pub fn subset(&self, indices: &[usize]) -> Vec<Point> {
        indices.iter().filter_map(|&i| self.get(i)).collect()
    }

    pub fn has_all(&self, indices: &[usize]) -> bool {
        indices.iter().all(|&i| self.get(i).is_some())
    }

    pub fn left_eye(&self) -> Vec<Point> {
        self.subset(&LEFT_EYE)
    }

    pub fn right_eye(&self) -> Vec<Point> {
        self.subset(&RIGHT_EYE)
    }

    pub fn left_iris(&self) -> Vec<Point> {
        self.subset(&LEFT_IRIS)
    }

    pub fn right_iris(&self) -> Vec<Point> {
        self.subset(&RIGHT_IRIS)
    }

    pub fn head_pose_points(&self) -> Vec<Point> {
        self.subset(&HEAD_POSE)
    }

    /// 实际存在的点数
    pub fn len(&self) -> usize {
        self.points.iter().filter(|p| p.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter_indexed(&self) -> impl Iterator<Item = (usize, Point)> + '_ {
        self.points
            .iter()
            .enumerate()
            .filter_map(|(i, p)| p.map(|p| (i, p)))
    }
}
