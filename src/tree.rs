/*
 *  Rudders, a library of state selection schedulers for symbolic execution.
 *  Copyright (C) 2024 ToTheAnd
 *
 *  Rudders is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  Rudders is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 *  GNU General Public License for more details.
 *
 *  You should have received a copy of the GNU General Public License
 *  along with Rudders. If not, see <https://www.gnu.org/licenses/>.
 */

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::state::ExecutionState;

pub type PTreeNodeRef<S> = Rc<RefCell<PTreeNode<S>>>;

/// A node of the fork-history tree. Interior nodes are historical fork points
/// and carry no state; every live state sits in exactly one leaf.
#[derive(Debug)]
pub struct PTreeNode<S: ExecutionState> {
    parent: Weak<RefCell<PTreeNode<S>>>,
    left: Option<PTreeNodeRef<S>>,
    right: Option<PTreeNodeRef<S>>,
    state: Option<Rc<S>>,
}

impl<S: ExecutionState> PTreeNode<S> {
    pub fn state(&self) -> Option<Rc<S>> {
        self.state.clone()
    }

    pub fn left(&self) -> Option<PTreeNodeRef<S>> {
        self.left.clone()
    }

    pub fn right(&self) -> Option<PTreeNodeRef<S>> {
        self.right.clone()
    }

    pub fn is_leaf(&self) -> bool {
        self.left.is_none() && self.right.is_none()
    }
}

/// The process tree: a binary tree recording the fork history of the search.
/// It is owned and maintained by the engine; searchers only walk it during
/// `select`. The tree grows at [`fork`](ProcessTree::fork) and shrinks at
/// [`remove`](ProcessTree::remove) as states terminate.
#[derive(Debug)]
pub struct ProcessTree<S: ExecutionState> {
    root: Option<PTreeNodeRef<S>>,
}

impl<S: ExecutionState> Default for ProcessTree<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: ExecutionState> ProcessTree<S> {
    pub fn new() -> Self {
        Self { root: None }
    }

    pub fn root(&self) -> Option<PTreeNodeRef<S>> {
        self.root.clone()
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    fn new_node(parent: Weak<RefCell<PTreeNode<S>>>, state: Rc<S>) -> PTreeNodeRef<S> {
        Rc::new(RefCell::new(PTreeNode { parent, left: None, right: None, state: Some(state) }))
    }

    /// Plant the initial state as the root leaf of an empty tree.
    pub fn plant(&mut self, state: &Rc<S>) -> PTreeNodeRef<S> {
        assert!(self.root.is_none(), "the process tree already has a root");
        let node = Self::new_node(Weak::new(), state.clone());
        state.set_ptree_node(&node);
        self.root = Some(node.clone());
        node
    }

    /// Split the leaf carrying a forking state into two fresh leaves. The node
    /// itself becomes an interior fork point; both successor states get a new
    /// leaf and an updated backreference.
    pub fn fork(&mut self, node: &PTreeNodeRef<S>, left: Rc<S>, right: Rc<S>) -> (PTreeNodeRef<S>, PTreeNodeRef<S>) {
        let mut forked = node.borrow_mut();
        assert!(forked.is_leaf() && forked.state.is_some(), "only a live leaf can fork");
        forked.state = None;
        let left_node = Self::new_node(Rc::downgrade(node), left.clone());
        let right_node = Self::new_node(Rc::downgrade(node), right.clone());
        left.set_ptree_node(&left_node);
        right.set_ptree_node(&right_node);
        forked.left = Some(left_node.clone());
        forked.right = Some(right_node.clone());
        (left_node, right_node)
    }

    /// Remove a leaf whose state has terminated, then prune the chain of
    /// interior nodes that became childless above it.
    pub fn remove(&mut self, node: &PTreeNodeRef<S>) {
        let mut current = node.clone();
        loop {
            debug_assert!(current.borrow().is_leaf());
            let parent = current.borrow().parent.upgrade();
            let Some(parent) = parent else {
                debug_assert!(self.root.as_ref().is_some_and(|r| Rc::ptr_eq(r, &current)));
                self.root = None;
                return;
            };
            {
                let mut p = parent.borrow_mut();
                if p.left.as_ref().is_some_and(|l| Rc::ptr_eq(l, &current)) {
                    p.left = None;
                } else {
                    debug_assert!(p.right.as_ref().is_some_and(|r| Rc::ptr_eq(r, &current)));
                    p.right = None;
                }
                if !p.is_leaf() {
                    // a sibling subtree keeps the parent alive
                    return;
                }
            }
            current = parent;
        }
    }
}
